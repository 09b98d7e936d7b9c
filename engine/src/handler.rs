use async_trait::async_trait;

use crate::{Result, State};

/// Something attached to an event of the engine.
#[async_trait]
pub trait Handler<C: Send>: Send {
    /// Runs when one of the events the handler was registered for fires.
    ///
    /// # Arguments
    /// * `state` - The engine state, handlers may change it.
    /// * `ctx` - The user's run context.
    async fn handle(&mut self, state: &mut State, ctx: &mut C) -> Result<()>;
}

/// A synchronous closure handler.
pub struct FnHandler<F>(F);

/// Wraps a closure into a `Handler`.
pub fn handler_fn<C, F>(f: F) -> FnHandler<F>
where
    F: FnMut(&mut State, &mut C) -> Result<()> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<C, F> Handler<C> for FnHandler<F>
where
    C: Send,
    F: FnMut(&mut State, &mut C) -> Result<()> + Send,
{
    async fn handle(&mut self, state: &mut State, ctx: &mut C) -> Result<()> {
        (self.0)(state, ctx)
    }
}
