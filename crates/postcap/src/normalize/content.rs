//! Body content-kind inference.
//!
//! Classifiers run in order and the first one that returns a kind wins:
//! the `Content-Type` header, then a JSON parse attempt, then raw.

use serde::{Deserialize, Serialize};

/// Closed set of body kinds the collection format distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Form,
    Raw,
}

/// One step in the classifier chain.
pub trait ContentClassifier: Send + Sync {
    fn classify(&self, content_type: Option<&str>, body: &[u8]) -> Option<ContentKind>;
}

/// Trusts a specific `Content-Type`. Absent or generic types fall through.
#[derive(Debug, Default)]
pub struct HeaderClassifier;

/// Types that say nothing about the payload shape.
const GENERIC_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "text/plain",
    "*/*",
];

/// Lower-cased media type without parameters (`charset=...` etc).
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl ContentClassifier for HeaderClassifier {
    fn classify(&self, content_type: Option<&str>, _body: &[u8]) -> Option<ContentKind> {
        let essence = essence(content_type?);
        if essence.is_empty() || GENERIC_TYPES.contains(&essence.as_str()) {
            return None;
        }
        // application/json, +json suffixes, text/json
        if essence.contains("json") {
            return Some(ContentKind::Json);
        }
        if essence == "application/x-www-form-urlencoded" {
            return Some(ContentKind::Form);
        }
        Some(ContentKind::Raw)
    }
}

/// Accepts bodies that parse as a JSON object or array.
///
/// Bare scalars (`42`, `"ok"`, `true`) are left to the raw fallback.
#[derive(Debug, Default)]
pub struct JsonSniffer;

impl ContentClassifier for JsonSniffer {
    fn classify(&self, _content_type: Option<&str>, body: &[u8]) -> Option<ContentKind> {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(_)) | Ok(serde_json::Value::Array(_)) => {
                Some(ContentKind::Json)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RawFallback;

impl ContentClassifier for RawFallback {
    fn classify(&self, _content_type: Option<&str>, _body: &[u8]) -> Option<ContentKind> {
        Some(ContentKind::Raw)
    }
}

/// Ordered classifier chain.
pub struct ContentSniffer {
    classifiers: Vec<Box<dyn ContentClassifier>>,
}

impl Default for ContentSniffer {
    fn default() -> Self {
        Self {
            classifiers: vec![
                Box::new(HeaderClassifier),
                Box::new(JsonSniffer),
                Box::new(RawFallback),
            ],
        }
    }
}

impl ContentSniffer {
    pub fn with_classifiers(classifiers: Vec<Box<dyn ContentClassifier>>) -> Self {
        Self { classifiers }
    }

    pub fn classify(&self, content_type: Option<&str>, body: &[u8]) -> ContentKind {
        self.classifiers
            .iter()
            .find_map(|c| c.classify(content_type, body))
            .unwrap_or(ContentKind::Raw)
    }
}
