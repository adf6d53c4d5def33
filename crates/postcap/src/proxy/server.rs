//! ProxyServer struct and main run loop.

use super::client::{create_http_client, HttpClient};
use super::forwarding::{error_response, forward_and_capture};
use super::network::create_listener;
use crate::dispatch::EventDispatcher;
use crate::flow::Flow;
use crate::store::PersistResult;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

struct Shared {
    dispatcher: Arc<EventDispatcher>,
    http_client: HttpClient,
    /// Queue to the dispatch worker; `None` once shutdown has begun.
    flows: Mutex<Option<mpsc::UnboundedSender<Flow>>>,
}

impl Shared {
    fn enqueue(&self, flow: Flow) {
        match self.flows.lock().as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(flow) {
                    warn!(url = %e.0.url, "dispatch worker gone, flow not captured");
                }
            }
            None => warn!(url = %flow.url, "shutting down, flow not captured"),
        }
    }
}

/// The capture proxy.
pub struct ProxyServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    flow_rx: mpsc::UnboundedReceiver<Flow>,
}

impl ProxyServer {
    /// Bind the listener. Port `0` picks a free port, see [`local_addr`](Self::local_addr).
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self, anyhow::Error> {
        let listener = create_listener(addr)?;
        let (flow_tx, flow_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                dispatcher,
                http_client: create_http_client(),
                flows: Mutex::new(Some(flow_tx)),
            }),
            flow_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then drain queued flows and flush the
    /// collection once more.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let store = Arc::clone(self.shared.dispatcher.store());
        let worker = tokio::spawn(dispatch_worker(
            Arc::clone(&self.shared.dispatcher),
            self.flow_rx,
        ));
        info!("Listening on http://{}", addr);
        info!(
            "Capturing *.{} into {}",
            self.shared.dispatcher.filter().domain(),
            store.path().display()
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let shared = Arc::clone(&shared);
                            async move { handle_request(shared, req).await }
                        });
                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .with_upgrades()
                            .await
                        {
                            debug!("Error serving connection from {}: {}", remote_addr, err);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutting down, flushing collection");
                    break;
                }
            }
        }

        // Dropping the only sender lets the worker finish what is queued.
        self.shared.flows.lock().take();
        worker.await?;

        let result = tokio::task::spawn_blocking(move || store.flush()).await?;
        match result {
            PersistResult::Failed(e) => Err(e.into()),
            _ => Ok(()),
        }
    }
}

async fn handle_request(
    shared: Arc<Shared>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() == Method::CONNECT {
        return Ok(open_tunnel(&shared, req));
    }

    let (response, flow) = forward_and_capture(&shared.http_client, req).await;
    if let Some(flow) = flow {
        shared.enqueue(flow);
    }
    Ok(response)
}

/// Apply queued flows one at a time, in completion order. Returns once the
/// queue is closed and empty.
async fn dispatch_worker(
    dispatcher: Arc<EventDispatcher>,
    mut flows: mpsc::UnboundedReceiver<Flow>,
) {
    while let Some(flow) = flows.recv().await {
        let dispatcher = Arc::clone(&dispatcher);
        // Merge and disk write block; the client response is already sent.
        if let Err(e) =
            tokio::task::spawn_blocking(move || dispatcher.on_flow_complete(&flow)).await
        {
            error!("dispatch task failed: {}", e);
        }
    }
    debug!("dispatch queue drained");
}

/// Answer a `CONNECT` and relay bytes once hyper hands over the connection.
fn open_tunnel(shared: &Shared, req: Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
    let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
        return error_response(400, "CONNECT target must be host:port");
    };

    let host = req.uri().host().unwrap_or_default();
    if shared.dispatcher.filter().matches(host) {
        warn!(
            authority = %authority,
            "in-scope HTTPS traffic is tunnelled without capture; use a TLS-intercepting engine"
        );
    } else {
        debug!(authority = %authority, "tunnelling");
    }

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                if let Err(e) = tunnel(upgraded, &authority).await {
                    debug!(authority = %authority, error = %e, "tunnel closed with error");
                }
            }
            Err(e) => error!("CONNECT upgrade failed: {}", e),
        }
    });

    Response::new(Full::new(Bytes::new()))
}

async fn tunnel(upgraded: Upgraded, authority: &str) -> std::io::Result<()> {
    let mut server = TcpStream::connect(authority).await?;
    let mut client = TokioIo::new(upgraded);
    let (up, down) = tokio::io::copy_bidirectional(&mut client, &mut server).await?;
    debug!(authority = %authority, up, down, "tunnel finished");
    Ok(())
}
