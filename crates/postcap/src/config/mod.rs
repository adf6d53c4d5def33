//! Configuration types for a capture session.

mod capture;
mod listen;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use capture::CaptureRules;
pub use listen::ListenConfig;

use crate::error::CaptureError;
use crate::filter::DomainFilter;
use crate::normalize::{HeaderPolicy, Normalizer, TRANSPORT_HEADERS};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Domain whose traffic is captured (subdomains included).
    #[serde(default)]
    pub target_domain: String,

    /// Collection name; also the default output file stem.
    #[serde(default)]
    pub collection_name: String,

    /// Output file. Defaults to `<collection_name>.json` in the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Reload an existing output file at startup instead of starting empty.
    #[serde(default = "default_resume")]
    pub resume: bool,

    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub capture: CaptureRules,
}

fn default_resume() -> bool {
    true
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_domain: String::new(),
            collection_name: String::new(),
            output: None,
            resume: default_resume(),
            listen: ListenConfig::default(),
            capture: CaptureRules::default(),
        }
    }
}

impl CaptureConfig {
    pub fn new(target_domain: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            target_domain: target_domain.into(),
            collection_name: collection_name.into(),
            ..Default::default()
        }
    }

    /// Load a YAML config file. Not validated: CLI values may still fill gaps.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: CaptureConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate configuration. Any error here is fatal at startup.
    pub fn validate(&self) -> Result<(), CaptureError> {
        DomainFilter::new(&self.target_domain)?;

        let name = self.collection_name.trim();
        if name.is_empty() {
            return Err(CaptureError::Config("collection name is empty".to_string()));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(CaptureError::Config(format!(
                "collection name '{name}' must not contain path separators"
            )));
        }
        if name == "." || name == ".." {
            return Err(CaptureError::Config(format!(
                "collection name '{name}' is not a valid file name"
            )));
        }

        self.listen.socket_addr()?;
        Ok(())
    }

    pub fn domain_filter(&self) -> Result<DomainFilter, CaptureError> {
        DomainFilter::new(&self.target_domain)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.json", self.collection_name.trim())))
    }

    /// Normalizer following the capture rules.
    pub fn normalizer(&self) -> Normalizer {
        let mut excluded: Vec<String> = TRANSPORT_HEADERS.iter().map(|h| h.to_string()).collect();
        excluded.extend(
            self.capture
                .excluded_headers
                .iter()
                .map(|h| h.trim().to_ascii_lowercase()),
        );
        let policy = HeaderPolicy {
            excluded,
            redact_authorization: self.capture.redact_authorization,
        };
        Normalizer::new(Arc::new(self.capture.placeholders), policy)
    }
}
