//! What gets retained from captured traffic.

use crate::normalize::placeholder::IdPlaceholders;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureRules {
    /// Replace `Authorization` values with a collection variable.
    #[serde(default = "default_true")]
    pub redact_authorization: bool,

    /// Extra request headers to drop, on top of the transport headers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_headers: Vec<String>,

    /// Path-parameter inference
    #[serde(default)]
    pub placeholders: IdPlaceholders,
}

fn default_true() -> bool {
    true
}

impl Default for CaptureRules {
    fn default() -> Self {
        Self {
            redact_authorization: true,
            excluded_headers: Vec::new(),
            placeholders: IdPlaceholders::default(),
        }
    }
}
