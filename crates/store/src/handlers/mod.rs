//! Route handlers of the gateway.

use http::StatusCode;
use tracing::warn;
use webstore_web::RequestContext;

mod config;
mod store;

pub use config::ConfigHandler;
pub use store::StoreHandler;

fn reply(ctx: &mut RequestContext, status: StatusCode, body: &str) -> String {
    ctx.set_status(status);
    body.to_owned()
}

fn method_not_allowed(ctx: &mut RequestContext, allow: &str) -> String {
    warn!("{} 405 METHOD_NOT_ALLOWED", ctx.client_ip());
    ctx.set_allow(allow);
    reply(ctx, StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

fn shutting_down(ctx: &mut RequestContext) -> String {
    reply(ctx, StatusCode::SERVICE_UNAVAILABLE, "service unavailable: shutting down")
}
