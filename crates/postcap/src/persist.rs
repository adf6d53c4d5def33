//! Durable collection writes.
//!
//! Bytes go to a temporary file in the target's directory, are synced, and
//! the temp file is renamed over the target. A crash at any point leaves
//! either the previous file or the new one, never a partial write.

use crate::error::CaptureError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// A fully written temp file waiting to replace its target.
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Write and sync `bytes` next to `target`. The target is not touched.
    pub fn stage(bytes: &[u8], target: &Path) -> Result<Self, CaptureError> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".postcap-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Atomically rename the temp file over the target.
    pub fn commit(self) -> Result<(), CaptureError> {
        self.tmp.persist(&self.target).map_err(|e| e.error)?;
        debug!(path = %self.target.display(), "collection file replaced");
        Ok(())
    }
}

/// Atomically replace `path` with `bytes`.
pub fn persist(bytes: &[u8], path: &Path) -> Result<(), CaptureError> {
    StagedWrite::stage(bytes, path)?.commit()
}
