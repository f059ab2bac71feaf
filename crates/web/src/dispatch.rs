use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;
use webstore_http::exchange::RequestContext;
use webstore_http::handler::Dispatcher;
use webstore_http::protocol::Reply;

use crate::chronometry::Stopwatch;
use crate::router::RouteRegistry;

/// Resolves completed requests against a [`RouteRegistry`] and runs the matching handler.
#[derive(Debug, Clone)]
pub struct RouteDispatcher {
    registry: Arc<RouteRegistry>,
}

impl RouteDispatcher {
    pub fn new(registry: Arc<RouteRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Dispatcher for RouteDispatcher {
    async fn dispatch(&self, mut ctx: RequestContext) -> Reply {
        let path = ctx.path().to_owned();

        let Some(route) = self.registry.find(&path) else {
            debug!(client_ip = %ctx.client_ip(), path, "node not found");
            ctx.set_status(StatusCode::NOT_FOUND);
            return ctx.into_reply("node not found");
        };

        if !route.enabled {
            debug!(client_ip = %ctx.client_ip(), path, "node not enabled");
            ctx.set_status(StatusCode::SERVICE_UNAVAILABLE);
            return ctx.into_reply("node not enabled");
        }

        let stopwatch = Stopwatch::start();
        let body = route.handler.handle(route.suffix(&path), &mut ctx).await;
        self.registry.record_duration(route.seq, stopwatch.elapsed());
        self.registry.record_access(route.seq);

        ctx.into_reply(body)
    }
}
