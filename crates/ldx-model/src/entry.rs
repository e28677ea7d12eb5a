//! Directory entries and attributes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A named, multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute values in server order.
    pub values: Vec<String>,
}

impl LdapAttribute {
    /// Creates a single-valued attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), values: vec![value.into()] }
    }

    /// Creates a multi-valued attribute.
    #[must_use]
    pub fn with_values(name: impl Into<String>, values: Vec<String>) -> Self {
        Self { name: name.into(), values }
    }
}

/// An entry returned from a directory search.
///
/// String and binary attributes are kept in separate maps; an attribute the
/// server marked as binary never appears in the string map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// String attributes.
    pub attributes: HashMap<String, Vec<String>>,
    /// Binary attributes.
    pub binary_attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    ///
    /// Used as the DN-only placeholder when no attribute fetch is performed.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self { dn: dn.into(), ..Self::default() }
    }

    /// Adds a string attribute value, appending if the attribute exists.
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.entry(name.into()).or_default().push(value.into());
    }

    /// Builder-style variant of [`add_attribute`](Self::add_attribute).
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_attribute(name, value);
        self
    }

    /// Returns the first value of a string attribute.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Returns all values of a string attribute.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Returns the first value of a binary attribute.
    #[must_use]
    pub fn get_binary_attr(&self, name: &str) -> Option<&[u8]> {
        self.binary_attributes.get(name).and_then(|v| v.first()).map(Vec::as_slice)
    }

    /// Whether the entry has the named attribute, string or binary.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.binary_attributes.contains_key(name)
    }

    /// Converts the string attributes into a list of [`LdapAttribute`]s.
    #[must_use]
    pub fn to_attribute_list(&self) -> Vec<LdapAttribute> {
        self.attributes
            .iter()
            .map(|(name, values)| LdapAttribute::with_values(name.clone(), values.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dn_only_entry_has_no_attributes() {
        let entry = LdapEntry::new("uid=jdoe,ou=people,dc=example,dc=org");
        assert_eq!(entry.dn, "uid=jdoe,ou=people,dc=example,dc=org");
        assert!(entry.attributes.is_empty());
        assert!(!entry.has_attr("uid"));
    }

    #[test]
    fn attribute_values_accumulate() {
        let entry = LdapEntry::new("cn=group,dc=example,dc=org")
            .with_attribute("member", "uid=a")
            .with_attribute("member", "uid=b");
        assert_eq!(entry.get_attr("member"), Some("uid=a"));
        assert_eq!(entry.get_attrs("member").unwrap().len(), 2);
    }

    #[test]
    fn binary_attributes_are_separate() {
        let mut entry = LdapEntry::new("uid=jdoe,dc=example,dc=org");
        entry.binary_attributes.insert("jpegPhoto".into(), vec![vec![1, 2, 3]]);
        assert_eq!(entry.get_binary_attr("jpegPhoto"), Some(&[1u8, 2, 3][..]));
        assert_eq!(entry.get_attr("jpegPhoto"), None);
        assert!(entry.has_attr("jpegPhoto"));
    }
}
