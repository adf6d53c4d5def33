//! Event dispatcher: the entry point a proxy engine calls per completed flow.
//!
//! Pipeline: domain filter, normalizer, merge, persist. Every failure is
//! logged and contained here so one bad flow never stops interception.

use crate::collection::MergeOutcome;
use crate::filter::DomainFilter;
use crate::flow::Flow;
use crate::normalize::Normalizer;
use crate::store::{CaptureStore, PersistResult};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the dispatcher did with a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Host outside the target domain; passed through untouched.
    Filtered,
    /// In scope but unusable; carries the error kind.
    Dropped(&'static str),
    Merged(MergeOutcome),
}

pub struct EventDispatcher {
    filter: DomainFilter,
    normalizer: Normalizer,
    store: Arc<CaptureStore>,
}

impl EventDispatcher {
    pub fn new(filter: DomainFilter, normalizer: Normalizer, store: Arc<CaptureStore>) -> Self {
        Self {
            filter,
            normalizer,
            store,
        }
    }

    pub fn store(&self) -> &Arc<CaptureStore> {
        &self.store
    }

    pub fn filter(&self) -> &DomainFilter {
        &self.filter
    }

    /// Handle one completed flow. Never fails.
    pub fn on_flow_complete(&self, flow: &Flow) -> DispatchOutcome {
        let Some(host) = flow.host() else {
            warn!(url = %flow.url, outcome = "MalformedURL", "dropping flow with unparseable URL");
            return DispatchOutcome::Dropped("MalformedURL");
        };
        if !self.filter.matches(&host) {
            debug!(host = %host, filter = %self.filter.domain(), "flow filtered");
            return DispatchOutcome::Filtered;
        }
        debug!(method = %flow.method, url = %flow.url, "flow accepted");

        let record = match self.normalizer.normalize(flow) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    method = %flow.method,
                    url = %flow.url,
                    outcome = e.kind(),
                    error = %e,
                    "dropping flow"
                );
                return DispatchOutcome::Dropped(e.kind());
            }
        };

        let applied = self.store.apply(record);
        match applied.outcome {
            MergeOutcome::Unchanged => {
                debug!(method = %flow.method, url = %flow.url, outcome = %applied.outcome, "merged")
            }
            outcome => info!(
                method = %flow.method,
                url = %flow.url,
                outcome = %outcome,
                version = applied.version,
                "merged"
            ),
        }

        match applied.persist {
            PersistResult::Written(version) => {
                debug!(version, path = %self.store.path().display(), "persist ok")
            }
            PersistResult::Failed(e) => error!(
                version = applied.version,
                path = %self.store.path().display(),
                outcome = e.kind(),
                error = %e,
                "persist failed; will retry on next change"
            ),
            PersistResult::Superseded => {
                debug!(version = applied.version, "newer snapshot already persisted")
            }
            PersistResult::Skipped => {}
        }

        DispatchOutcome::Merged(applied.outcome)
    }
}
