//! Path-parameter inference.
//!
//! A rule looks at one concrete path segment and decides whether it is an
//! identifier that should collapse into a placeholder token. The rule is
//! pluggable so grouping can be tuned without touching the merge engine.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token substituted for identifier-like segments.
pub const ID_PLACEHOLDER: &str = "{id}";

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static UUID pattern")
});

/// One path segment after placeholder inference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Literal(String),
    Placeholder(&'static str),
}

impl PathSegment {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, PathSegment::Placeholder(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathSegment::Literal(s) => s,
            PathSegment::Placeholder(token) => token,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a concrete segment is a path parameter.
pub trait PlaceholderRule: Send + Sync {
    /// Return the placeholder token for `segment`, or `None` to keep it literal.
    fn placeholder(&self, segment: &str) -> Option<&'static str>;

    fn classify(&self, segment: &str) -> PathSegment {
        match self.placeholder(segment) {
            Some(token) => PathSegment::Placeholder(token),
            None => PathSegment::Literal(segment.to_string()),
        }
    }
}

/// Default identifier heuristic.
///
/// - `numeric`: all ASCII digits (`42`, `0007`)
/// - `uuid`: canonical 8-4-4-4-12 hex, any case
/// - `hex_min_length`: when set, an all-hex token at least this long that
///   contains at least one digit (object ids, hashes). Off by default since
///   plain words like `facade` are valid hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IdPlaceholders {
    pub numeric: bool,
    pub uuid: bool,
    pub hex_min_length: Option<usize>,
}

impl Default for IdPlaceholders {
    fn default() -> Self {
        Self {
            numeric: true,
            uuid: true,
            hex_min_length: None,
        }
    }
}

impl PlaceholderRule for IdPlaceholders {
    fn placeholder(&self, segment: &str) -> Option<&'static str> {
        if segment.is_empty() {
            return None;
        }
        if self.numeric && segment.bytes().all(|b| b.is_ascii_digit()) {
            return Some(ID_PLACEHOLDER);
        }
        if self.uuid && UUID_RE.is_match(segment) {
            return Some(ID_PLACEHOLDER);
        }
        if let Some(min) = self.hex_min_length {
            if segment.len() >= min
                && segment.bytes().all(|b| b.is_ascii_hexdigit())
                && segment.bytes().any(|b| b.is_ascii_digit())
            {
                return Some(ID_PLACEHOLDER);
            }
        }
        None
    }
}

/// Rule that never substitutes. Every concrete path gets its own entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlaceholders;

impl PlaceholderRule for NoPlaceholders {
    fn placeholder(&self, _segment: &str) -> Option<&'static str> {
        None
    }
}
