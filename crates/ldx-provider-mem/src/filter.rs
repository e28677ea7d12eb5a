//! RFC 4515 filter parsing and evaluation.
//!
//! Hand-written because the wire-level crates only escape filters, they do
//! not evaluate them. Matching is case-insensitive for attribute names and
//! values, the behavior of the common caseIgnore matching rules.

use ldx_model::entry::LdapEntry;

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(String, String),
    Present(String),
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        finale: Option<String>,
    },
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
}

impl Filter {
    /// Parses an RFC 4515 filter string.
    pub(crate) fn parse(input: &str) -> Result<Self, String> {
        let mut parser = Parser { bytes: input.as_bytes(), pos: 0 };
        let filter = parser.parse_filter()?;
        if parser.pos != parser.bytes.len() {
            return Err(format!("trailing input after filter at byte {}", parser.pos));
        }
        Ok(filter)
    }

    /// Whether the filter matches the entry.
    pub(crate) fn matches(&self, entry: &LdapEntry) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|f| f.matches(entry)),
            Self::Or(parts) => parts.iter().any(|f| f.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
            Self::Equality(attr, value) => {
                values(entry, attr).any(|v| v.eq_ignore_ascii_case(value))
            }
            Self::Present(attr) => {
                entry.attributes.keys().any(|k| k.eq_ignore_ascii_case(attr))
                    || entry.binary_attributes.keys().any(|k| k.eq_ignore_ascii_case(attr))
            }
            Self::Substring { attribute, initial, any, finale } => {
                values(entry, attribute).any(|v| substring_matches(v, initial, any, finale))
            }
            Self::GreaterOrEqual(attr, value) => {
                values(entry, attr).any(|v| ordered_cmp(v, value).is_ge())
            }
            Self::LessOrEqual(attr, value) => {
                values(entry, attr).any(|v| ordered_cmp(v, value).is_le())
            }
        }
    }
}

fn values<'a>(entry: &'a LdapEntry, attr: &str) -> impl Iterator<Item = &'a str> {
    let attr = attr.to_ascii_lowercase();
    entry
        .attributes
        .iter()
        .filter(move |(k, _)| k.to_ascii_lowercase() == attr)
        .flat_map(|(_, v)| v.iter().map(String::as_str))
}

fn ordered_cmp(left: &str, right: &str) -> std::cmp::Ordering {
    // Numeric when both sides are integers, otherwise case-insensitive text.
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.to_ascii_lowercase().cmp(&right.to_ascii_lowercase()),
    }
}

fn substring_matches(
    value: &str,
    initial: &Option<String>,
    any: &[String],
    finale: &Option<String>,
) -> bool {
    let value = value.to_ascii_lowercase();
    let mut rest = value.as_str();

    if let Some(prefix) = initial {
        let Some(after) = rest.strip_prefix(&prefix.to_ascii_lowercase()) else {
            return false;
        };
        rest = after;
    }
    for part in any {
        let part = part.to_ascii_lowercase();
        let Some(at) = rest.find(&part) else { return false };
        rest = &rest[at + part.len()..];
    }
    if let Some(suffix) = finale {
        return rest.ends_with(&suffix.to_ascii_lowercase());
    }
    true
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn parse_filter(&mut self) -> Result<Filter, String> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_set()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_set()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err("unexpected end of filter".into()),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_set(&mut self) -> Result<Vec<Filter>, String> {
        let mut parts = Vec::new();
        while self.peek() == Some(b'(') {
            parts.push(self.parse_filter()?);
        }
        if parts.is_empty() {
            return Err(format!("empty filter set at byte {}", self.pos));
        }
        Ok(parts)
    }

    fn parse_item(&mut self) -> Result<Filter, String> {
        let attribute = self.take_while(|b| !matches!(b, b'=' | b'<' | b'>' | b'(' | b')'));
        if attribute.is_empty() {
            return Err(format!("missing attribute at byte {}", self.pos));
        }

        let op = match (self.peek(), self.peek_at(1)) {
            (Some(b'>'), Some(b'=')) => {
                self.pos += 2;
                b'>'
            }
            (Some(b'<'), Some(b'=')) => {
                self.pos += 2;
                b'<'
            }
            (Some(b'='), _) => {
                self.pos += 1;
                b'='
            }
            _ => return Err(format!("expected comparison operator at byte {}", self.pos)),
        };

        let raw = self.take_while(|b| b != b')');
        match op {
            b'>' => Ok(Filter::GreaterOrEqual(attribute, unescape(&raw)?)),
            b'<' => Ok(Filter::LessOrEqual(attribute, unescape(&raw)?)),
            _ if raw == "*" => Ok(Filter::Present(attribute)),
            _ if raw.contains('*') => {
                let mut pieces = raw.split('*');
                let initial = pieces.next().filter(|s| !s.is_empty()).map(str::to_owned);
                let mut any: Vec<String> = pieces.map(str::to_owned).collect();
                let finale = match any.pop() {
                    Some(last) if !last.is_empty() => Some(last),
                    _ => None,
                };
                let any = any
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .map(|s| unescape(&s))
                    .collect::<Result<_, _>>()?;
                Ok(Filter::Substring {
                    attribute,
                    initial: initial.map(|s| unescape(&s)).transpose()?,
                    any,
                    finale: finale.map(|s| unescape(&s)).transpose()?,
                })
            }
            _ => Ok(Filter::Equality(attribute, unescape(&raw)?)),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected {:?} at byte {}", char::from(byte), self.pos))
        }
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }
}

/// Resolves RFC 4515 `\xx` escapes.
fn unescape(value: &str) -> Result<String, String> {
    if !value.contains('\\') {
        return Ok(value.to_owned());
    }
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| format!("truncated escape in value {value:?}"))?;
            let hex = std::str::from_utf8(hex).map_err(|_| "non-ascii escape".to_string())?;
            out.push(
                u8::from_str_radix(hex, 16).map_err(|_| format!("bad escape \\{hex}"))?,
            );
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| "escape produced invalid utf-8".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LdapEntry {
        LdapEntry::new("uid=jdoe,ou=people,dc=example,dc=org")
            .with_attribute("objectClass", "person")
            .with_attribute("uid", "jdoe")
            .with_attribute("cn", "John Doe")
            .with_attribute("mail", "jdoe@example.org")
            .with_attribute("employeeNumber", "42")
    }

    #[test]
    fn equality_is_case_insensitive() {
        let filter = Filter::parse("(UID=JDoe)").unwrap();
        assert!(filter.matches(&entry()));
    }

    #[test]
    fn and_or_not_combine() {
        let filter = Filter::parse("(&(objectClass=person)(|(uid=other)(uid=jdoe)))").unwrap();
        assert!(filter.matches(&entry()));

        let negated = Filter::parse("(!(uid=jdoe))").unwrap();
        assert!(!negated.matches(&entry()));
    }

    #[test]
    fn presence_and_substrings() {
        assert!(Filter::parse("(mail=*)").unwrap().matches(&entry()));
        assert!(!Filter::parse("(telephoneNumber=*)").unwrap().matches(&entry()));
        assert!(Filter::parse("(cn=John*)").unwrap().matches(&entry()));
        assert!(Filter::parse("(cn=*Doe)").unwrap().matches(&entry()));
        assert!(Filter::parse("(mail=j*example*)").unwrap().matches(&entry()));
        assert!(!Filter::parse("(cn=Jane*)").unwrap().matches(&entry()));
    }

    #[test]
    fn ordering_comparisons_are_numeric_when_possible() {
        assert!(Filter::parse("(employeeNumber>=7)").unwrap().matches(&entry()));
        assert!(!Filter::parse("(employeeNumber<=7)").unwrap().matches(&entry()));
    }

    #[test]
    fn escaped_values_round_trip() {
        let mut e = entry();
        e.add_attribute("description", "a*b");
        let filter = Filter::parse(r"(description=a\2ab)").unwrap();
        assert_eq!(filter, Filter::Equality("description".into(), "a*b".into()));
        assert!(filter.matches(&e));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(Filter::parse("uid=jdoe").is_err());
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(uid=jdoe").is_err());
        assert!(Filter::parse("(uid=jdoe))").is_err());
    }
}
