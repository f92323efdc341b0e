//! Shared fixture for the two-party scenarios in `SPEC_FULL.md` §8: a loopback transport pair
//! plus thin constructors for the handler closures each scenario wires up.

use std::sync::Arc;

use futures::future::BoxFuture;
use kataribe_core::{EventHandlerFn, Payload, RpcHandlerFn};

pub use kataribe_loopback::LoopbackTransport;

pub fn rpc_handler<F, Fut>(f: F) -> RpcHandlerFn
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Payload, String>> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)) as BoxFuture<'static, Result<Payload, String>>)
}

pub fn event_handler<F, Fut>(f: F) -> EventHandlerFn
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)) as BoxFuture<'static, ()>)
}
