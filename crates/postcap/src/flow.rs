//! Completed request/response exchanges handed over by a proxy engine.
//!
//! A `Flow` is an immutable value: the engine builds it once the exchange
//! is over (or has failed) and gives it to the dispatcher. Only the
//! normalizer looks inside it.

use bytes::Bytes;

/// Ordered header list. Duplicate names are allowed; lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<&hyper::HeaderMap> for HeaderList {
    /// Values that are not visible ASCII are decoded lossily.
    fn from(map: &hyper::HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

/// The response half of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Option<Bytes>,
}

/// One request/response exchange as observed by the proxy engine.
///
/// `response` is `None` when the exchange never completed (client abort,
/// upstream connect failure); such flows are dropped by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub method: String,
    pub url: String,
    pub headers: HeaderList,
    pub body: Option<Bytes>,
    pub response: Option<FlowResponse>,
}

impl Flow {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderList::new(),
            body: None,
            response: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a response with an optional content type and body.
    pub fn with_response(
        mut self,
        status: u16,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> Self {
        let mut headers = HeaderList::new();
        if let Some(ct) = content_type {
            headers.push("Content-Type", ct);
        }
        let body = body.into();
        self.response = Some(FlowResponse {
            status,
            headers,
            body: (!body.is_empty()).then_some(body),
        });
        self
    }

    /// Host part of the URL, if it parses. Used by the dispatcher before
    /// the full normalization step.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
