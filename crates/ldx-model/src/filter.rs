//! Search filters with positional parameters.

use serde::{Deserialize, Serialize};

/// A search filter template with positional `{0}`, `{1}`, … parameters.
///
/// Parameter values are escaped per RFC 4515 when the filter is formatted,
/// so user input can never alter the filter structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    filter: String,
    parameters: Vec<String>,
}

impl SearchFilter {
    /// Creates a filter from a template with no parameters bound yet.
    #[must_use]
    pub fn new(filter: impl Into<String>) -> Self {
        Self { filter: filter.into(), parameters: Vec::new() }
    }

    /// Binds the next positional parameter.
    #[must_use]
    pub fn parameter(mut self, value: impl Into<String>) -> Self {
        self.parameters.push(value.into());
        self
    }

    /// Returns the raw template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.filter
    }

    /// Renders the filter, substituting escaped parameter values.
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = self.filter.clone();
        for (i, value) in self.parameters.iter().enumerate() {
            out = out.replace(&format!("{{{i}}}"), &escape_value(value));
        }
        out
    }
}

impl std::fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// Escapes a filter assertion value per RFC 4515.
#[must_use]
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str(r"\5c"),
            '*' => out.push_str(r"\2a"),
            '(' => out.push_str(r"\28"),
            ')' => out.push_str(r"\29"),
            '\0' => out.push_str(r"\00"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_positional_parameters() {
        let filter = SearchFilter::new("(&(objectClass=person)(uid={0}))").parameter("jdoe");
        assert_eq!(filter.format(), "(&(objectClass=person)(uid=jdoe))");
    }

    #[test]
    fn repeated_parameter_is_substituted_everywhere() {
        let filter = SearchFilter::new("(|(uid={0})(cn={0}))").parameter("jdoe");
        assert_eq!(filter.format(), "(|(uid=jdoe)(cn=jdoe))");
    }

    #[test]
    fn parameter_values_are_escaped() {
        let filter = SearchFilter::new("(uid={0})").parameter(r"*)(uid=*\");
        assert_eq!(filter.format(), r"(uid=\2a\29\28uid=\2a\5c)");
    }

    #[test]
    fn template_without_parameters_is_unchanged() {
        let filter = SearchFilter::new("(objectClass=*)");
        assert_eq!(filter.format(), "(objectClass=*)");
    }
}
