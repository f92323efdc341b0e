//! Ordered pre-send / post-receive interception and mutation of envelopes (§4.3).

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::MiddlewareError;

/// Which direction an envelope is traveling when a middleware sees it (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// About to be sent.
    Out,
    /// Just received.
    In,
}

/// The context handed to a middleware for the duration of its own call. Middleware may mutate
/// the envelope through `mutate`, matching the source's `mutate(fn)` callback hook, but may not
/// replace it (§4.3, Design Note #4).
pub struct MiddlewareContext<'a> {
    pub direction: Direction,
    pub envelope: &'a mut Envelope,
}

impl<'a> MiddlewareContext<'a> {
    pub fn mutate(&mut self, f: impl FnOnce(&mut Envelope)) {
        f(self.envelope)
    }
}

/// A user-supplied interceptor of envelopes traveling in either direction.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError>;
}

#[async_trait]
impl<F> Middleware for F
where
    F: for<'a> Fn(&'a mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> {
        self(ctx)
    }
}

/// The ordered middleware chain. Executed sequentially in registration order, awaiting each;
/// an envelope passes through the entire pipeline before the next stage (§4.3). There is no
/// short-circuit — every middleware runs unless one returns an error, which aborts the chain.
#[derive(Default, Clone)]
pub struct Pipeline {
    middlewares: Vec<std::sync::Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(middlewares: Vec<std::sync::Arc<dyn Middleware>>) -> Self {
        Pipeline { middlewares }
    }

    pub async fn run(&self, direction: Direction, envelope: &mut Envelope) -> Result<(), MiddlewareError> {
        let mut ctx = MiddlewareContext { direction, envelope };
        for mw in &self.middlewares {
            mw.handle(&mut ctx).await?;
        }
        Ok(())
    }
}
