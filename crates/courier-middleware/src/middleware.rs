//! Core middleware trait and types.
//!
//! Every dispatch stage implements [`Middleware`]. A stage receives the
//! dispatch context, the envelope and a [`Next`] continuation; it may inspect
//! or re-stamp the envelope, call `next.run` once, short-circuit by returning
//! an envelope without calling it, and post-process whatever comes back.
//!
//! The chain ends in a [`Terminal`], which actually handles the envelope.
//!
//! # Example
//!
//! ```
//! use courier_core::{BoxFuture, CourierResult, Envelope};
//! use courier_middleware::{DispatchContext, Middleware, Next};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut DispatchContext,
//!         envelope: Envelope,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, CourierResult<Envelope>> {
//!         Box::pin(async move {
//!             let result = next.run(ctx, envelope).await;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "dispatched");
//!             result
//!         })
//!     }
//! }
//! ```

use crate::context::DispatchContext;
use courier_core::{BoxFuture, CourierResult, Envelope};
use std::future::Future;

/// Result of running (part of) the dispatch chain.
pub type DispatchResult = CourierResult<Envelope>;

/// A dispatch stage.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once
/// - A stage that saves shared state before calling `next` restores it on
///   every exit path, including errors
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    fn name(&self) -> &'static str;

    /// Processes the envelope through this stage.
    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        envelope: Envelope,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult>;
}

/// The last step of the chain.
pub trait Terminal: Send + Sync {
    /// Handles the envelope.
    fn handle<'a>(&'a self, ctx: &'a mut DispatchContext, envelope: Envelope) -> BoxFuture<'a, DispatchResult>;
}

/// Continuation invoking the rest of the chain.
///
/// Consumed by [`run`](Self::run), so it can only be called once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Terminal(&'a dyn Terminal),
}

impl<'a> Next<'a> {
    /// Creates a `Next` invoking `middleware`, then `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a `Next` invoking the terminal step.
    pub(crate) fn terminal(terminal: &'a dyn Terminal) -> Self {
        Self {
            inner: NextInner::Terminal(terminal),
        }
    }

    /// Invokes the rest of the chain.
    pub async fn run(self, ctx: &mut DispatchContext, envelope: Envelope) -> DispatchResult {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, envelope, *next).await,
            NextInner::Terminal(terminal) => terminal.handle(ctx, envelope).await,
        }
    }
}

/// A terminal step built from an async function.
///
/// # Example
///
/// ```
/// use courier_core::{CourierError, Envelope};
/// use courier_middleware::FnTerminal;
///
/// let terminal = FnTerminal::new(|envelope: Envelope| async move { Ok::<_, CourierError>(envelope) });
/// # let _ = terminal;
/// ```
pub struct FnTerminal<F> {
    func: F,
}

impl<F> FnTerminal<F> {
    /// Creates a terminal from `func`.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Terminal for FnTerminal<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = DispatchResult> + Send + 'static,
{
    fn handle<'a>(&'a self, _ctx: &'a mut DispatchContext, envelope: Envelope) -> BoxFuture<'a, DispatchResult> {
        Box::pin((self.func)(envelope))
    }
}
