use async_trait::async_trait;
use webstore_http::exchange::RequestContext;

/// A route's request handler.
///
/// `suffix` is the request path with the route prefix removed. The handler reads the
/// request from `ctx`, sets the response status and headers on it, and returns the
/// response body. Handlers are total: every request yields a body.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, suffix: &str, ctx: &mut RequestContext) -> String;
}
