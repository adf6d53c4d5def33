//! In-memory collection model.
//!
//! The model is a tree of folders mirroring the literal path segments of
//! captured URLs. Each folder holds request entries keyed by
//! [`IdentityKey`]; at most one entry per key per folder. Entries are only
//! ever appended or updated in place, so output order is first-seen order.
//!
//! # Module Structure
//!
//! - `merge` - merge engine applying call records to the model
//! - `postman` - Postman v2.1 serializer and reader

mod merge;
pub mod postman;

pub use merge::{merge, MergeOutcome};

use crate::normalize::{CallRecord, CapturedBody, HttpMethod, PathSegment};
use std::collections::BTreeSet;
use std::fmt;

/// What makes two calls "the same API call".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub method: HttpMethod,
    /// Placeholder-normalized path, e.g. `/users/{id}`.
    pub path: String,
    pub query_keys: BTreeSet<String>,
}

impl IdentityKey {
    pub fn of(record: &CallRecord) -> Self {
        Self {
            method: record.method,
            path: record.normalized_path(),
            query_keys: record.query.iter().map(|(k, _)| k.clone()).collect(),
        }
    }
}

impl fmt::Display for IdentityKey {
    /// `GET /orders?status&page`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if !self.query_keys.is_empty() {
            let keys: Vec<&str> = self.query_keys.iter().map(String::as_str).collect();
            write!(f, "?{}", keys.join("&"))?;
        }
        Ok(())
    }
}

/// Most recent concrete request for an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleRequest {
    pub url: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<CapturedBody>,
}

/// Most recent response for an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Option<CapturedBody>,
}

/// Split a call record into the stored example pair.
pub(crate) fn examples_of(record: CallRecord) -> (ExampleRequest, ExampleResponse) {
    let request = ExampleRequest {
        url: record.url,
        scheme: record.scheme,
        host: record.host,
        port: record.port,
        segments: record.segments,
        query: record.query,
        headers: record.headers,
        body: record.body,
    };
    let response = ExampleResponse {
        status: record.response_status,
        content_type: record.response_content_type,
        body: record.response_body,
    };
    (request, response)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEntry {
    pub key: IdentityKey,
    pub request: ExampleRequest,
    pub response: ExampleResponse,
    /// Model sequence number at insertion.
    pub first_seen: u64,
    /// Model sequence number of the last update.
    pub last_seen: u64,
}

impl RequestEntry {
    /// Display name used in the collection.
    pub fn name(&self) -> String {
        self.key.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Folder {
    pub name: String,
    pub children: Vec<Folder>,
    pub items: Vec<RequestEntry>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Folder> {
        self.children.iter().find(|f| f.name == name)
    }

    /// Existing child with `name`, or a new one appended at the end.
    pub fn child_or_insert(&mut self, name: &str) -> &mut Folder {
        let idx = match self.children.iter().position(|f| f.name == name) {
            Some(idx) => idx,
            None => {
                self.children.push(Folder::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    pub fn entry(&self, key: &IdentityKey) -> Option<&RequestEntry> {
        self.items.iter().find(|e| &e.key == key)
    }

    /// Entries in this folder and all descendants.
    pub fn request_count(&self) -> usize {
        self.items.len()
            + self
                .children
                .iter()
                .map(Folder::request_count)
                .sum::<usize>()
    }

    /// Descend along `path`, if every folder exists.
    pub fn find(&self, path: &[&str]) -> Option<&Folder> {
        path.iter().try_fold(self, |folder, name| folder.child(name))
    }
}

/// The collection being built by a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionModel {
    pub name: String,
    pub root: Folder,
    /// Bumped on every accepted mutation; feeds first/last seen.
    sequence: u64,
}

impl CollectionModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Folder::default(),
            sequence: 0,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn request_count(&self) -> usize {
        self.root.request_count()
    }

    pub fn is_empty(&self) -> bool {
        self.request_count() == 0
    }
}

/// Folder names for a normalized path: literal segments only.
pub fn folder_path(normalized: &[PathSegment]) -> Vec<&str> {
    normalized
        .iter()
        .filter_map(|s| match s {
            PathSegment::Literal(name) => Some(name.as_str()),
            PathSegment::Placeholder(_) => None,
        })
        .collect()
}
