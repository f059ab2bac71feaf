use std::sync::Arc;

use async_trait::async_trait;

use crate::exchange::RequestContext;
use crate::protocol::Reply;

/// Turns a completed request into a reply.
///
/// The connection loop calls this once per request that passed every lifecycle
/// check; routing, handler invocation and statistics live behind it.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, ctx: RequestContext) -> Reply;
}

#[async_trait]
impl<D> Dispatcher for Arc<D>
where
    D: Dispatcher + ?Sized,
{
    async fn dispatch(&self, ctx: RequestContext) -> Reply {
        (**self).dispatch(ctx).await
    }
}

/// A [`Dispatcher`] made from an async function
#[derive(Debug)]
pub struct DispatchFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Dispatcher for DispatchFn<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Reply> + Send,
{
    async fn dispatch(&self, ctx: RequestContext) -> Reply {
        (self.f)(ctx).await
    }
}

pub fn dispatch_fn<F, Fut>(f: F) -> DispatchFn<F>
where
    F: Fn(RequestContext) -> Fut,
    Fut: Future<Output = Reply>,
{
    DispatchFn { f }
}
