//! Per-connection request loop.
//!
//! [`HttpConnection`] reads requests off a socket with the codec, walks each one
//! through the [`exchange`](crate::exchange) lifecycle, hands completed requests to a
//! [`Dispatcher`](crate::handler::Dispatcher) and writes the reply back. Requests on
//! one connection are served strictly in order; the connection stays open between
//! them until the peer closes it or the idle timeout fires.

mod http_connection;

pub use http_connection::HttpConnection;
