//! Built-in forward proxy engine.
//!
//! A plain HTTP/1.1 forward proxy that feeds completed flows to the
//! [`EventDispatcher`](crate::dispatch::EventDispatcher):
//! - absolute-form `http://` requests are forwarded, buffered and captured
//! - `CONNECT` tunnels are relayed byte-for-byte without interception
//! - upstream failures answer `502` and yield a response-less flow
//!
//! TLS interception is left to external engines, which call the dispatcher
//! directly with their own `Flow` values.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct and accept loop
//! - `forwarding` - request forwarding and flow capture
//! - `client` - upstream HTTP client
//! - `network` - listener socket setup

mod client;
mod forwarding;
mod network;
mod server;

pub use server::ProxyServer;
