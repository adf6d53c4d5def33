//! Merge engine: applies one call record to the collection model.

use super::{examples_of, folder_path, CollectionModel, IdentityKey, RequestEntry};
use crate::normalize::CallRecord;
use std::fmt;

/// Result of applying a call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeOutcome {
    /// New identity; entry appended to its folder.
    Inserted,
    /// Known identity with different example data; example replaced.
    Updated,
    /// Known identity with byte-identical examples; model untouched.
    Unchanged,
}

impl MergeOutcome {
    /// Whether the model changed and needs persisting.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, MergeOutcome::Unchanged)
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeOutcome::Inserted => "Inserted",
            MergeOutcome::Updated => "Updated",
            MergeOutcome::Unchanged => "Unchanged",
        })
    }
}

/// Apply `record` to `model`.
///
/// Folders for the literal segments are created in path order, then the
/// entry with the record's identity key is inserted, replaced or left alone.
/// Callers serialize access; two records for the same key simply overwrite
/// each other in application order.
pub fn merge(model: &mut CollectionModel, record: CallRecord) -> MergeOutcome {
    let key = IdentityKey::of(&record);
    let folders: Vec<String> = folder_path(&record.normalized)
        .into_iter()
        .map(str::to_string)
        .collect();
    let (request, response) = examples_of(record);

    // Sequence is only consumed on mutation so Unchanged leaves the model equal.
    let next = model.sequence() + 1;
    let mut folder = &mut model.root;
    for name in &folders {
        folder = folder.child_or_insert(name);
    }

    let outcome = match folder.items.iter_mut().find(|e| e.key == key) {
        None => {
            folder.items.push(RequestEntry {
                key,
                request,
                response,
                first_seen: next,
                last_seen: next,
            });
            MergeOutcome::Inserted
        }
        Some(entry) if entry.request == request && entry.response == response => {
            MergeOutcome::Unchanged
        }
        Some(entry) => {
            entry.request = request;
            entry.response = response;
            entry.last_seen = next;
            MergeOutcome::Updated
        }
    };

    if outcome.is_mutation() {
        model.next_sequence();
    }
    outcome
}
