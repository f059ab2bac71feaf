//! Routing and serving on top of `webstore-http`.
//!
//! - [`RouteRegistry`]: ordered prefix routes with per-route counters and optional
//!   [`chronometry`] sampling
//! - [`RequestHandler`]: what a route runs, given the path suffix and the request
//! - [`RouteDispatcher`]: the bridge from completed requests to route handlers
//! - [`Server`]: accept loop with admission control, connection limit, TLS and
//!   shutdown

pub mod chronometry;
pub mod router;

mod admission;
mod dispatch;
mod handler;
mod server;
mod shutdown;
mod tls;

pub use admission::AddressCheck;
pub use dispatch::RouteDispatcher;
pub use handler::RequestHandler;
pub use router::{RouteError, RouteMatch, RouteRegistry, RouteStats};
pub use server::{Server, ServerBuilder, ServerConfig, ServerError, ThreadingModel};
pub use shutdown::{Shutdown, ShutdownReason};
pub use tls::{TlsError, TlsMaterial};

// re-exported so handler crates need no direct dependency on the engine
pub use webstore_http::exchange::{Limits, RequestContext, RequestMethod};
pub use webstore_http::protocol::Reply;
