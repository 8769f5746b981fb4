//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse declared patterns (`/api/auth/**`, `/api/auth`, `/`)
//! - Match request paths against the pattern prefix
//! - Compute the path left after the prefix for forwarding
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Matching is segment-aware: `/api/auth` does not match `/api/authority`
//! - A trailing `/**` is the only wildcard; no regex in the hot path

use thiserror::Error;

/// Why a pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("wildcards are only allowed as a trailing '/**': {0}")]
    MisplacedWildcard(String),

    #[error("pattern must not contain a query or fragment: {0}")]
    QueryOrFragment(String),
}

/// A compiled path-prefix pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    prefix: String,
}

impl PathPattern {
    /// Parse a pattern as written in the route configuration.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(raw.to_string()));
        }
        if raw.contains('?') || raw.contains('#') {
            return Err(PatternError::QueryOrFragment(raw.to_string()));
        }

        let without_glob = raw.strip_suffix("/**").unwrap_or(raw);
        if without_glob.contains('*') {
            return Err(PatternError::MisplacedWildcard(raw.to_string()));
        }

        let trimmed = without_glob.trim_end_matches('/');
        let prefix = if trimmed.is_empty() { "/" } else { trimmed };

        Ok(Self {
            raw: raw.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// The pattern as declared.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The normalized prefix, without trailing slash or glob.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix length used to rank competing matches.
    pub fn specificity(&self) -> usize {
        if self.is_catch_all() {
            0
        } else {
            self.prefix.len()
        }
    }

    fn is_catch_all(&self) -> bool {
        self.prefix == "/"
    }

    /// Returns true if the request path falls under this prefix.
    pub fn matches(&self, path: &str) -> bool {
        if self.is_catch_all() {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// The part of `path` after the prefix, always starting with '/'.
    ///
    /// `path` must match this pattern.
    pub fn remainder<'a>(&self, path: &'a str) -> &'a str {
        if self.is_catch_all() {
            return path;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some("") | None => "/",
            Some(rest) => rest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_and_plain_prefix_are_equivalent() {
        let glob = PathPattern::parse("/api/auth/**").unwrap();
        let plain = PathPattern::parse("/api/auth/").unwrap();
        assert_eq!(glob.prefix(), "/api/auth");
        assert_eq!(plain.prefix(), "/api/auth");
    }

    #[test]
    fn test_segment_aware_matching() {
        let pattern = PathPattern::parse("/api/auth/**").unwrap();
        assert!(pattern.matches("/api/auth"));
        assert!(pattern.matches("/api/auth/"));
        assert!(pattern.matches("/api/auth/login"));
        assert!(!pattern.matches("/api/authority"));
        assert!(!pattern.matches("/api"));
        assert!(!pattern.matches("/API/auth"));
    }

    #[test]
    fn test_catch_all() {
        for raw in ["/", "/**"] {
            let pattern = PathPattern::parse(raw).unwrap();
            assert!(pattern.matches("/anything/at/all"));
            assert_eq!(pattern.specificity(), 0);
            assert_eq!(pattern.remainder("/x/y"), "/x/y");
        }
    }

    #[test]
    fn test_remainder() {
        let pattern = PathPattern::parse("/api/users/**").unwrap();
        assert_eq!(pattern.remainder("/api/users/42/profile"), "/42/profile");
        assert_eq!(pattern.remainder("/api/users"), "/");
    }

    #[test]
    fn test_rejects_malformed_patterns() {
        assert!(matches!(
            PathPattern::parse("api/users"),
            Err(PatternError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            PathPattern::parse("/api/*/users"),
            Err(PatternError::MisplacedWildcard(_))
        ));
        assert!(matches!(
            PathPattern::parse("/api?x=1"),
            Err(PatternError::QueryOrFragment(_))
        ));
    }
}
