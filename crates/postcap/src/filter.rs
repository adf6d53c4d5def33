//! Domain filter deciding which flows are captured.
//!
//! A host is in scope when it equals the filter or is a subdomain of it
//! (dot-boundary suffix match). Comparison is ASCII case-insensitive and
//! ignores a trailing root dot. No wildcards, no regex.

use crate::error::CaptureError;

/// Returns true if `host` equals `filter` or is a subdomain of it.
pub fn in_scope(host: &str, filter: &str) -> bool {
    let host = host.trim_end_matches('.');
    let filter = filter.trim_end_matches('.');
    if host.is_empty() || filter.is_empty() || host.len() < filter.len() {
        return false;
    }

    let split = host.len() - filter.len();
    // Non-ASCII hosts could make the byte split land inside a character.
    if !host.is_char_boundary(split) {
        return false;
    }
    let (prefix, suffix) = host.split_at(split);
    if !suffix.eq_ignore_ascii_case(filter) {
        return false;
    }
    prefix.is_empty() || prefix.ends_with('.')
}

/// A validated, lower-cased domain filter built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFilter {
    domain: String,
}

impl DomainFilter {
    /// Validate and build a filter. Rejects anything that is not a bare
    /// host name: schemes, paths, ports, wildcards, whitespace, empty labels.
    pub fn new(domain: &str) -> Result<Self, CaptureError> {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return Err(CaptureError::Config("target domain is empty".to_string()));
        }
        if domain.contains("://") {
            return Err(CaptureError::Config(format!(
                "target domain '{domain}' must not include a scheme"
            )));
        }
        if let Some(bad) = domain
            .chars()
            .find(|c| matches!(c, '/' | ':' | '*' | '?' | '#' | '@') || c.is_whitespace())
        {
            return Err(CaptureError::Config(format!(
                "target domain '{domain}' contains invalid character '{bad}'"
            )));
        }
        if domain.split('.').any(str::is_empty) {
            return Err(CaptureError::Config(format!(
                "target domain '{domain}' has an empty label"
            )));
        }
        Ok(Self { domain })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn matches(&self, host: &str) -> bool {
        in_scope(host, &self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_subdomain_in_scope() {
        assert!(in_scope("api.example.com", "example.com"));
        assert!(in_scope("a.b.example.com", "example.com"));
    }

    #[test]
    fn test_exact_match_in_scope() {
        assert!(in_scope("example.com", "example.com"));
    }

    #[test]
    fn test_suffix_without_dot_boundary_rejected() {
        assert!(!in_scope("notexample.com", "example.com"));
        assert!(!in_scope("example.com.evil.net", "example.com"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(in_scope("API.Example.COM", "example.com"));
        assert!(in_scope("api.example.com", "EXAMPLE.com"));
    }

    #[test]
    fn test_trailing_dot_ignored() {
        assert!(in_scope("api.example.com.", "example.com"));
    }

    #[test]
    fn test_empty_inputs_never_match() {
        assert!(!in_scope("", "example.com"));
        assert!(!in_scope("example.com", ""));
    }

    #[test]
    fn test_non_ascii_host_does_not_panic() {
        assert!(!in_scope("üxample.com", "example.com"));
        assert!(in_scope("bücher.example.com", "example.com"));
    }

    #[test]
    fn test_filter_validation() {
        assert_eq!(
            DomainFilter::new(" Example.com ").unwrap().domain(),
            "example.com"
        );
        assert!(DomainFilter::new("").is_err());
        assert!(DomainFilter::new("https://example.com").is_err());
        assert!(DomainFilter::new("example.com/api").is_err());
        assert!(DomainFilter::new("example.com:8080").is_err());
        assert!(DomainFilter::new("*.example.com").is_err());
        assert!(DomainFilter::new("example..com").is_err());
    }

    #[test]
    fn test_filter_matches() {
        let filter = DomainFilter::new("example.com").unwrap();
        assert!(filter.matches("api.example.com"));
        assert!(!filter.matches("example.org"));
    }

    proptest! {
        #[test]
        fn prop_any_subdomain_is_in_scope(label in "[a-z0-9]{1,12}", domain in "[a-z]{1,10}\\.[a-z]{2,4}") {
            let host = format!("{label}.{domain}");
            prop_assert!(in_scope(&host, &domain));
        }

        #[test]
        fn prop_glued_prefix_is_out_of_scope(label in "[a-z0-9]{1,12}", domain in "[a-z]{1,10}\\.[a-z]{2,4}") {
            let host = format!("{label}{domain}");
            prop_assert!(!in_scope(&host, &domain));
        }
    }
}
