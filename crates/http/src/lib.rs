//! The HTTP/1.1 engine behind webstore.
//!
//! A small, buffered HTTP/1.1 server core on top of tokio. Request bodies are framed
//! by `Content-Length` only and are accumulated in memory before dispatch; responses
//! are fully buffered [`protocol::Reply`] values.
//!
//! # Architecture
//!
//! - [`codec`]: request decoding and response encoding for `tokio_util::codec`
//! - [`protocol`]: message, header, reply and error types
//! - [`exchange`]: the per-request lifecycle (begin, feed, finish) and its limits
//! - [`handler`]: the [`handler::Dispatcher`] trait completed requests are handed to
//! - [`connection`]: the per-connection loop tying the above together
//!
//! # Example
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use tokio::net::TcpListener;
//! use tracing::{info, warn};
//! use webstore_http::connection::HttpConnection;
//! use webstore_http::exchange::{Limits, RequestContext};
//! use webstore_http::handler::dispatch_fn;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let dispatcher = dispatch_fn(|ctx: RequestContext| async move { ctx.into_reply("hello") });
//!
//!     loop {
//!         let (stream, peer) = listener.accept().await?;
//!         let (reader, writer) = stream.into_split();
//!         let connection = HttpConnection::new(reader, writer, peer.ip(), Limits::default());
//!         match connection.process(&dispatcher).await {
//!             Ok(()) => info!(%peer, "connection closed"),
//!             Err(e) => warn!(%peer, cause = %e, "connection aborted"),
//!         }
//!     }
//! }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - No chunked transfer coding; such requests get a 400
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod exchange;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
