//! Request normalizer.
//!
//! Turns a completed [`Flow`] into a [`CallRecord`]: method parsed into a
//! closed enum, URL split into host/segments/query, retained headers,
//! classified request and response bodies, and the placeholder-normalized
//! path used for grouping.
//!
//! # Module Structure
//!
//! - `content` - ordered content-kind classifiers
//! - `placeholder` - pluggable path-parameter inference

pub mod content;
pub mod placeholder;

pub use content::{ContentKind, ContentSniffer};
pub use placeholder::{IdPlaceholders, NoPlaceholders, PathSegment, PlaceholderRule};

use crate::error::CaptureError;
use crate::flow::{Flow, HeaderList};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP verbs the collection format can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            "TRACE" => Ok(HttpMethod::Trace),
            _ => Err(CaptureError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A body together with its inferred kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBody {
    pub kind: ContentKind,
    pub bytes: Bytes,
}

impl CapturedBody {
    /// Body as text. Invalid UTF-8 is replaced, never rejected.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Canonical form of one captured call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub method: HttpMethod,
    /// The captured URL as sent, without fragment.
    pub url: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Concrete, non-empty path segments as they appeared in the URL.
    pub segments: Vec<String>,
    /// `segments` after placeholder inference.
    pub normalized: Vec<PathSegment>,
    /// Decoded query pairs in received order; duplicates kept.
    pub query: Vec<(String, String)>,
    /// Retained request headers, one entry per case-insensitive name.
    pub headers: Vec<(String, String)>,
    pub body: Option<CapturedBody>,
    pub response_status: u16,
    pub response_content_type: Option<String>,
    pub response_body: Option<CapturedBody>,
}

impl CallRecord {
    /// Concrete path, `/` for the root.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Placeholder-normalized path, e.g. `/users/{id}`.
    pub fn normalized_path(&self) -> String {
        let parts: Vec<&str> = self.normalized.iter().map(PathSegment::as_str).collect();
        format!("/{}", parts.join("/"))
    }
}

/// Which request headers make it into the stored example.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    /// Lower-cased names that are never retained.
    pub excluded: Vec<String>,
    /// Replace the `Authorization` value with a collection variable.
    pub redact_authorization: bool,
}

/// Transport and hop-by-hop headers, dropped from every example.
pub const TRANSPORT_HEADERS: &[&str] = &[
    "content-length",
    "host",
    "connection",
    "proxy-connection",
    "proxy-authorization",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Value written in place of a redacted `Authorization` header.
pub const AUTHORIZATION_VARIABLE: &str = "{{authorization}}";

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            excluded: TRANSPORT_HEADERS.iter().map(|h| h.to_string()).collect(),
            redact_authorization: true,
        }
    }
}

impl HeaderPolicy {
    /// Keep retained headers, merging repeated names into one entry.
    pub fn retain(&self, headers: &HeaderList) -> Vec<(String, String)> {
        let mut kept: Vec<(String, String)> = Vec::new();
        for (name, value) in headers.iter() {
            let lower = name.to_ascii_lowercase();
            if self.excluded.contains(&lower) {
                continue;
            }
            let value = if self.redact_authorization && lower == "authorization" {
                AUTHORIZATION_VARIABLE.to_string()
            } else {
                value.to_string()
            };
            match kept.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some((_, existing)) if lower == "authorization" => *existing = value,
                Some((_, existing)) => {
                    let sep = if lower == "cookie" { "; " } else { ", " };
                    existing.push_str(sep);
                    existing.push_str(&value);
                }
                None => kept.push((name.to_string(), value)),
            }
        }
        kept
    }
}

/// Flow to call-record conversion. Read-only and shareable across threads.
#[derive(Clone)]
pub struct Normalizer {
    rule: Arc<dyn PlaceholderRule>,
    sniffer: Arc<ContentSniffer>,
    headers: HeaderPolicy,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(IdPlaceholders::default()), HeaderPolicy::default())
    }
}

impl Normalizer {
    pub fn new(rule: Arc<dyn PlaceholderRule>, headers: HeaderPolicy) -> Self {
        Self {
            rule,
            sniffer: Arc::new(ContentSniffer::default()),
            headers,
        }
    }

    pub fn with_sniffer(mut self, sniffer: ContentSniffer) -> Self {
        self.sniffer = Arc::new(sniffer);
        self
    }

    pub fn placeholder_rule(&self) -> &dyn PlaceholderRule {
        self.rule.as_ref()
    }

    /// Build the call record for a completed flow.
    pub fn normalize(&self, flow: &Flow) -> Result<CallRecord, CaptureError> {
        let response = flow.response.as_ref().ok_or(CaptureError::IncompleteFlow)?;
        let method: HttpMethod = flow.method.parse()?;

        let mut url = url::Url::parse(&flow.url)
            .map_err(|e| CaptureError::MalformedUrl(format!("{}: {e}", flow.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CaptureError::MalformedUrl(format!(
                "{}: unsupported scheme '{}'",
                flow.url,
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CaptureError::MalformedUrl(format!("{}: missing host", flow.url)))?
            .to_ascii_lowercase();
        url.set_fragment(None);

        let segments: Vec<String> = url
            .path_segments()
            .map(|parts| {
                parts
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let normalized = segments.iter().map(|s| self.rule.classify(s)).collect();
        let query = url.query_pairs().into_owned().collect();

        let content_type = flow.headers.get("content-type");
        let body = match non_empty(flow.body.as_ref()) {
            Some(bytes) => Some(self.request_body(content_type, bytes)?),
            None => None,
        };

        let response_content_type = response.headers.get("content-type").map(str::to_string);
        let response_body = non_empty(response.body.as_ref())
            .map(|bytes| self.response_body(response_content_type.as_deref(), bytes));

        Ok(CallRecord {
            method,
            url: url.as_str().to_string(),
            scheme: url.scheme().to_string(),
            host,
            port: url.port(),
            segments,
            normalized,
            query,
            headers: self.headers.retain(&flow.headers),
            body,
            response_status: response.status,
            response_content_type,
            response_body,
        })
    }

    /// Request bodies must parse as their declared kind.
    fn request_body(
        &self,
        content_type: Option<&str>,
        bytes: &Bytes,
    ) -> Result<CapturedBody, CaptureError> {
        let kind = self.sniffer.classify(content_type, bytes);
        match kind {
            ContentKind::Json => {
                serde_json::from_slice::<serde_json::Value>(bytes)
                    .map_err(|e| CaptureError::MalformedBody(format!("invalid JSON: {e}")))?;
            }
            ContentKind::Form => {
                std::str::from_utf8(bytes).map_err(|e| {
                    CaptureError::MalformedBody(format!("form body is not UTF-8: {e}"))
                })?;
            }
            ContentKind::Raw => {}
        }
        Ok(CapturedBody {
            kind,
            bytes: bytes.clone(),
        })
    }

    /// Response bodies never fail; a mislabelled body is kept raw.
    fn response_body(&self, content_type: Option<&str>, bytes: &Bytes) -> CapturedBody {
        let mut kind = self.sniffer.classify(content_type, bytes);
        if kind == ContentKind::Json && serde_json::from_slice::<serde_json::Value>(bytes).is_err()
        {
            kind = ContentKind::Raw;
        }
        CapturedBody {
            kind,
            bytes: bytes.clone(),
        }
    }
}

fn non_empty(body: Option<&Bytes>) -> Option<&Bytes> {
    body.filter(|b| !b.is_empty())
}
