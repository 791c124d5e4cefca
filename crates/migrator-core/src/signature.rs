//! Database signatures used as capability keys.
//!
//! A [`Signature`] identifies a database product and version. Every field is
//! optional: a missing field is a wildcard when the signature is used as the
//! key of a registered capability, and "unknown" when it describes a live
//! connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor name and version tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub product_name: Option<String>,
    pub product_version: Option<String>,
    pub major_version: Option<i32>,
    pub minor_version: Option<i32>,
}

impl Signature {
    /// Signature matching every database of a product, whatever its version.
    pub fn product(name: impl Into<String>) -> Self {
        Self {
            product_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        major_version: i32,
        minor_version: i32,
    ) -> Self {
        Self {
            product_name: Some(name.into()),
            product_version: Some(version.into()),
            major_version: Some(major_version),
            minor_version: Some(minor_version),
        }
    }

    pub fn with_major(mut self, major_version: i32) -> Self {
        self.major_version = Some(major_version);
        self
    }

    pub fn with_minor(mut self, minor_version: i32) -> Self {
        self.minor_version = Some(minor_version);
        self
    }

    /// Build a signature from a product name and a raw version string such as
    /// `8.0.33-log` or `15.4 (Debian 15.4-1.pgdg120+1)`.
    pub fn parse_version(name: impl Into<String>, raw_version: &str) -> Self {
        let version = raw_version.split_whitespace().next().unwrap_or("").to_string();
        let mut numbers = version
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<i32>().ok());
        let major_version = numbers.next().flatten();
        let minor_version = numbers.next().flatten();
        Self {
            product_name: Some(name.into()),
            product_version: if version.is_empty() { None } else { Some(version) },
            major_version,
            minor_version,
        }
    }

    /// Number of non-wildcard fields.
    pub fn specificity(&self) -> usize {
        [
            self.product_name.is_some(),
            self.product_version.is_some(),
            self.major_version.is_some(),
            self.minor_version.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Whether a capability registered under `base` applies to `candidate`.
///
/// Every non-null field of `base` must match:
/// - the product name as a case-insensitive prefix of the candidate's name,
/// - the product version by equality,
/// - the major version when `base.major <= candidate.major`,
/// - the minor version when `base.minor <= candidate.minor`, compared only
///   while the major versions are equal or `base` has no major version.
pub fn is_assignable(base: &Signature, candidate: &Signature) -> bool {
    if let Some(name) = &base.product_name {
        match &candidate.product_name {
            Some(other) if starts_with_ignore_case(other, name) => {}
            _ => return false,
        }
    }
    if let Some(version) = &base.product_version {
        if candidate.product_version.as_ref() != Some(version) {
            return false;
        }
    }
    let mut same_major = true;
    if let Some(major) = base.major_version {
        match candidate.major_version {
            Some(other) if major <= other => same_major = major == other,
            _ => return false,
        }
    }
    if let Some(minor) = base.minor_version {
        match candidate.minor_version {
            Some(other) if !same_major || minor <= other => {}
            _ => return false,
        }
    }
    true
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.is_char_boundary(prefix.len())
        && value[..prefix.len()].eq_ignore_ascii_case(prefix)
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.product_name.as_deref().unwrap_or("*"))?;
        if let Some(version) = &self.product_version {
            write!(f, " {version}")?;
        }
        match (self.major_version, self.minor_version) {
            (Some(major), Some(minor)) => write!(f, " ({major}.{minor})"),
            (Some(major), None) => write!(f, " ({major}.*)"),
            (None, Some(minor)) => write!(f, " (*.{minor})"),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_base_matches_everything() {
        let base = Signature::default();
        assert!(is_assignable(&base, &Signature::product("MySQL")));
        assert!(is_assignable(&base, &Signature::default()));
    }

    #[test]
    fn test_name_is_case_insensitive_prefix() {
        let base = Signature::product("microsoft sql");
        assert!(is_assignable(
            &base,
            &Signature::product("Microsoft SQL Server")
        ));
        assert!(!is_assignable(&base, &Signature::product("MySQL")));
        assert!(!is_assignable(&base, &Signature::default()));
    }

    #[test]
    fn test_product_version_requires_equality() {
        let base = Signature::new("NuoDB", "2.0.1", 2, 27);
        assert!(!is_assignable(&base, &Signature::new("NuoDB", "2.0.2", 2, 27)));
        assert!(is_assignable(&base, &Signature::new("NuoDB", "2.0.1", 2, 27)));
    }

    #[test]
    fn test_numeric_versions_are_lower_bounds() {
        let base = Signature::new("NuoDB", "2.0.1", 2, 27);
        assert!(is_assignable(&base, &Signature::new("NuoDB", "2.0.1", 2, 30)));
        assert!(!is_assignable(&base, &Signature::new("NuoDB", "2.0.1", 2, 20)));

        let base = Signature::product("Oracle").with_major(12).with_minor(2);
        let newer = Signature::product("Oracle").with_major(19).with_minor(0);
        assert!(is_assignable(&base, &newer));
        let older = Signature::product("Oracle").with_major(11).with_minor(9);
        assert!(!is_assignable(&base, &older));
    }

    #[test]
    fn test_null_candidate_field_does_not_match() {
        let base = Signature::product("MySQL").with_major(8);
        assert!(!is_assignable(&base, &Signature::product("MySQL")));
    }

    #[test]
    fn test_parse_version() {
        let sig = Signature::parse_version("PostgreSQL", "15.4 (Debian 15.4-1.pgdg120+1)");
        assert_eq!(sig.product_version.as_deref(), Some("15.4"));
        assert_eq!(sig.major_version, Some(15));
        assert_eq!(sig.minor_version, Some(4));

        let sig = Signature::parse_version("MySQL", "8.0.33-log");
        assert_eq!(sig.major_version, Some(8));
        assert_eq!(sig.minor_version, Some(0));
    }

    #[test]
    fn test_specificity_and_display() {
        let sig = Signature::new("NuoDB", "2.0.1", 2, 27);
        assert_eq!(sig.specificity(), 4);
        assert_eq!(sig.to_string(), "NuoDB 2.0.1 (2.27)");
        assert_eq!(Signature::product("MySQL").specificity(), 1);
        assert_eq!(Signature::default().to_string(), "*");
    }
}
