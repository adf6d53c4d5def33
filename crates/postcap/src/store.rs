//! Capture store: the session's single collection model and its file.
//!
//! Merge and serialization for one record happen under the model lock, so
//! every serialized snapshot is a whole model state. The disk write happens
//! after that lock is released, under a separate writer lock that tracks the
//! newest version on disk; a snapshot older than what is already written is
//! discarded instead of overwriting newer data.

use crate::collection::{merge, postman, CollectionModel, MergeOutcome};
use crate::error::CaptureError;
use crate::normalize::{CallRecord, Normalizer};
use crate::persist::persist;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

struct ModelState {
    model: CollectionModel,
    /// Incremented on every mutation.
    version: u64,
}

struct WriterState {
    /// Newest version known to be on disk.
    written: u64,
}

/// What happened to the file after a merge.
#[derive(Debug)]
pub enum PersistResult {
    /// Nothing to write (Unchanged, or already up to date).
    Skipped,
    /// This version is now on disk.
    Written(u64),
    /// A newer version was written first; this snapshot was dropped.
    Superseded,
    /// Write failed; the model keeps the change and the next write retries.
    Failed(CaptureError),
}

/// Result of applying one call record.
#[derive(Debug)]
pub struct Applied {
    pub outcome: MergeOutcome,
    /// Model version after the merge.
    pub version: u64,
    pub persist: PersistResult,
}

pub struct CaptureStore {
    state: Mutex<ModelState>,
    writer: Mutex<WriterState>,
    path: PathBuf,
}

impl CaptureStore {
    /// Empty store writing to `path`. Nothing is written until the first
    /// mutation.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(ModelState {
                model: CollectionModel::new(name),
                version: 0,
            }),
            writer: Mutex::new(WriterState { written: 0 }),
            path: path.into(),
        }
    }

    /// Store for `path`, reloading an existing collection file.
    ///
    /// The file's requests are replayed through `normalizer` and the merge
    /// engine, so the rebuilt model follows the current grouping rules. An
    /// unreadable file is an error: resuming must never clobber it.
    pub fn open(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        normalizer: &Normalizer,
    ) -> Result<Self, CaptureError> {
        let store = Self::new(name, path);
        if !store.path.exists() {
            debug!(path = %store.path.display(), "no collection file, starting fresh");
            return Ok(store);
        }

        let existing = fs::read(&store.path)?;
        let (_, flows) = postman::read_flows(&existing)?;
        {
            let mut state = store.state.lock();
            for flow in &flows {
                match normalizer.normalize(flow) {
                    Ok(record) => {
                        merge(&mut state.model, record);
                    }
                    Err(e) => warn!(
                        url = %flow.url,
                        error = %e,
                        "skipping unreadable request in existing collection"
                    ),
                }
            }
            // Name changes or regrouping mean the file is stale.
            if postman::serialize(&state.model)? != existing {
                state.version = 1;
            }
            info!(
                path = %store.path.display(),
                requests = state.model.request_count(),
                "resumed collection"
            );
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current model version.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Newest version on disk.
    pub fn persisted_version(&self) -> u64 {
        self.writer.lock().written
    }

    /// Copy of the current model.
    pub fn snapshot(&self) -> CollectionModel {
        self.state.lock().model.clone()
    }

    /// Merge `record` and, if the model changed, write the new snapshot.
    pub fn apply(&self, record: CallRecord) -> Applied {
        let (outcome, version, bytes) = {
            let mut state = self.state.lock();
            let outcome = merge(&mut state.model, record);
            if !outcome.is_mutation() {
                return Applied {
                    outcome,
                    version: state.version,
                    persist: PersistResult::Skipped,
                };
            }
            state.version += 1;
            (outcome, state.version, postman::serialize(&state.model))
        };

        let persist = match bytes {
            Ok(bytes) => self.write(version, &bytes),
            Err(e) => PersistResult::Failed(e),
        };
        Applied {
            outcome,
            version,
            persist,
        }
    }

    /// Write the current model if it is newer than the file.
    pub fn flush(&self) -> PersistResult {
        let (version, bytes) = {
            let state = self.state.lock();
            if state.version <= self.persisted_version() {
                return PersistResult::Skipped;
            }
            (state.version, postman::serialize(&state.model))
        };
        match bytes {
            Ok(bytes) => self.write(version, &bytes),
            Err(e) => PersistResult::Failed(e),
        }
    }

    fn write(&self, version: u64, bytes: &[u8]) -> PersistResult {
        let mut writer = self.writer.lock();
        if writer.written >= version {
            return PersistResult::Superseded;
        }
        match persist(bytes, &self.path) {
            Ok(()) => {
                writer.written = version;
                debug!(version, path = %self.path.display(), "collection persisted");
                PersistResult::Written(version)
            }
            Err(e) => PersistResult::Failed(e),
        }
    }
}
