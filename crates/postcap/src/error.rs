//! Error taxonomy for the capture pipeline.
//!
//! Per-flow errors (`IncompleteFlow`, `MalformedUrl`, `MalformedBody`,
//! `UnsupportedMethod`) are contained by the dispatcher. `Io` and `Serialize`
//! come out of persistence and are never fatal. `Config` is raised at startup
//! and stops the process before interception begins.

/// Errors produced by the capture pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("flow has no completed response")]
    IncompleteFlow,
    #[error("malformed URL: {0}")]
    MalformedUrl(String),
    #[error("malformed body: {0}")]
    MalformedBody(String),
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode collection: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CaptureError {
    /// Short stable label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::IncompleteFlow => "IncompleteFlow",
            CaptureError::MalformedUrl(_) => "MalformedURL",
            CaptureError::MalformedBody(_) => "MalformedBody",
            CaptureError::UnsupportedMethod(_) => "UnsupportedMethod",
            CaptureError::Io(_) => "IOError",
            CaptureError::Serialize(_) => "SerializeError",
            CaptureError::Config(_) => "ConfigError",
        }
    }
}
