//! Upstream HTTP client creation.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE: Duration = Duration::from_secs(60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_IDLE_PER_HOST: usize = 32;

/// Create the shared upstream client with connection pooling.
///
/// Plain HTTP only; `https` URIs are refused by the connector and surface as
/// a `502` with an incomplete flow.
pub fn create_http_client() -> HttpClient {
    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(KEEPALIVE));
    http_connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
    http_connector.set_nodelay(true);

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .build(http_connector);

    debug!(
        "Upstream connection pool: max_idle={}, idle_timeout={}s",
        MAX_IDLE_PER_HOST,
        POOL_IDLE_TIMEOUT.as_secs()
    );
    client
}
