//! Request forwarding and flow capture.
//!
//! The request body is buffered, sent upstream unchanged (minus proxy-only
//! headers), and the buffered response is handed back to the client as is.
//! A decoded copy of both bodies goes into the captured [`Flow`].

use super::client::HttpClient;
use crate::flow::{Flow, FlowResponse, HeaderList};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderName, CONTENT_ENCODING, HOST};
use hyper::{HeaderMap, Request, Response, Uri};
use std::io::Read;
use tracing::{debug, error};

/// Headers addressed to the proxy itself, never forwarded.
const PROXY_HEADERS: &[&str] = &["proxy-connection", "proxy-authorization"];

/// Helper function to create an error response.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Absolute target URI: as sent for absolute-form requests, rebuilt from
/// the `Host` header for origin-form ones.
pub fn absolute_uri(uri: &Uri, headers: &HeaderMap) -> Option<Uri> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Some(uri.clone());
    }
    let host = headers.get(HOST)?.to_str().ok()?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://{host}{path}").parse().ok()
}

fn is_proxy_header(name: &HeaderName) -> bool {
    PROXY_HEADERS.contains(&name.as_str())
}

/// Undo `Content-Encoding` for the captured copy. Unknown encodings and
/// corrupt streams keep the bytes as received.
pub fn decoded_body(headers: &HeaderMap, body: &Bytes) -> Bytes {
    let Some(encoding) = headers.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()) else {
        return body.clone();
    };
    let mut out = Vec::new();
    let result = match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => GzDecoder::new(&body[..]).read_to_end(&mut out),
        "deflate" => ZlibDecoder::new(&body[..]).read_to_end(&mut out).or_else(|_| {
            out.clear();
            DeflateDecoder::new(&body[..]).read_to_end(&mut out)
        }),
        "identity" | "" => return body.clone(),
        other => {
            debug!(encoding = other, "leaving body with unsupported encoding as is");
            return body.clone();
        }
    };
    match result {
        Ok(_) => Bytes::from(out),
        Err(e) => {
            debug!(encoding, error = %e, "failed to decode body, keeping raw bytes");
            body.clone()
        }
    }
}

fn non_empty(bytes: Bytes) -> Option<Bytes> {
    (!bytes.is_empty()).then_some(bytes)
}

/// Forward `req` upstream and capture the exchange.
///
/// Returns the response for the client and the captured flow, if the
/// request got far enough to have a target URL.
pub async fn forward_and_capture(
    http_client: &HttpClient,
    req: Request<hyper::body::Incoming>,
) -> (Response<Full<Bytes>>, Option<Flow>) {
    let (parts, body) = req.into_parts();

    let Some(uri) = absolute_uri(&parts.uri, &parts.headers) else {
        return (error_response(400, "Request target has no host"), None);
    };

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("Failed to collect request body: {}", e);
            return (error_response(400, "Failed to read request body"), None);
        }
    };

    let mut flow = Flow {
        method: parts.method.as_str().to_string(),
        url: uri.to_string(),
        headers: HeaderList::from(&parts.headers),
        body: non_empty(decoded_body(&parts.headers, &body_bytes)),
        response: None,
    };

    debug!("Forwarding to: {}", uri);

    let mut upstream_req = Request::builder().method(parts.method).uri(uri);
    for (key, value) in parts.headers.iter() {
        if !is_proxy_header(key) {
            upstream_req = upstream_req.header(key, value);
        }
    }
    let upstream_req = match upstream_req.body(Full::new(body_bytes)) {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to build upstream request: {}", e);
            return (error_response(400, "Invalid request"), Some(flow));
        }
    };

    let upstream_response = match http_client.request(upstream_req).await {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to forward request to upstream: {}", e);
            return (error_response(502, "Bad Gateway"), Some(flow));
        }
    };

    let (parts, body) = upstream_response.into_parts();
    let response_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("Failed to collect upstream response body: {}", e);
            return (
                error_response(502, "Failed to read upstream response"),
                Some(flow),
            );
        }
    };

    flow.response = Some(FlowResponse {
        status: parts.status.as_u16(),
        headers: HeaderList::from(&parts.headers),
        body: non_empty(decoded_body(&parts.headers, &response_bytes)),
    });

    (
        Response::from_parts(parts, Full::new(response_bytes)),
        Some(flow),
    )
}
