//! Ordered dispatch pipeline.
//!
//! A [`Pipeline`] is an immutable list of stages built once per bus. Each
//! dispatch walks the stages in order and ends in the terminal step supplied
//! by the caller.
//!
//! ## Standard stages
//!
//! The bus assembles the standard stages in the order of [`Stage`]:
//!
//! 1. **Logging** - dispatch span, structured logs and metrics
//! 2. **Origin** - link nested dispatches to the transport message being handled
//! 3. **Security** - propagate the security principal across the dispatch
//! 4. **Metadata** - attach stamps declared by the routing table
//! 5. **Deduplicate** - drop in-flight duplicates
//! 6. **Backlog** - release the backlog counter of received envelopes
//! 7. **Cache** - serve query results from the cache
//! 8. **Transaction** - wrap handling in a transaction
//! 9. **Send** - hand routed envelopes to their transports
//!
//! The terminal step (normally [`HandleMessage`](crate::stages::HandleMessage))
//! runs the handlers.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next, Terminal};
use courier_core::{CourierError, CourierResult, Envelope};
use std::fmt;
use std::sync::Arc;

/// A type-erased stage that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Position of a standard stage in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Dispatch span, logs and metrics.
    Logging = 1,
    /// Origin transport message tracking.
    Origin = 2,
    /// Security principal propagation.
    Security = 3,
    /// Routing-declared stamps.
    Metadata = 4,
    /// In-flight deduplication.
    Deduplicate = 5,
    /// Backlog release on receipt.
    Backlog = 6,
    /// Cache-aside for queries.
    Cache = 7,
    /// Transaction wrapping.
    Transaction = 8,
    /// Sending to transports.
    Send = 9,
}

impl Stage {
    /// Every standard stage in pipeline order.
    pub const ALL: [Self; 9] = [
        Self::Logging,
        Self::Origin,
        Self::Security,
        Self::Metadata,
        Self::Deduplicate,
        Self::Backlog,
        Self::Cache,
        Self::Transaction,
        Self::Send,
    ];

    /// The stage name, matching [`Middleware::name`] of its implementation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Logging => "logging",
            Self::Origin => "origin",
            Self::Security => "security",
            Self::Metadata => "metadata",
            Self::Deduplicate => "deduplicate",
            Self::Backlog => "backlog",
            Self::Cache => "cache",
            Self::Transaction => "transaction",
            Self::Send => "send",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The immutable stage list of a bus.
///
/// # Example
///
/// ```
/// use courier_core::{CourierError, Envelope, Message};
/// use courier_middleware::{DispatchContext, FnTerminal, Pipeline};
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder().build();
/// let terminal = FnTerminal::new(|envelope: Envelope| async move { Ok::<_, CourierError>(envelope) });
///
/// let mut ctx = DispatchContext::new("bus", "Ping");
/// let envelope = Envelope::new(Message::new("Ping", serde_json::json!({})));
/// let out = pipeline.dispatch(&mut ctx, envelope, &terminal).await.unwrap();
/// assert_eq!(out.message_name(), "Ping");
/// # });
/// ```
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs the envelope through every stage, then `terminal`.
    pub async fn dispatch(
        &self,
        ctx: &mut DispatchContext,
        envelope: Envelope,
        terminal: &dyn Terminal,
    ) -> DispatchResult {
        self.build_chain(terminal).run(ctx, envelope).await
    }

    fn build_chain<'a>(&'a self, terminal: &'a dyn Terminal) -> Next<'a> {
        let mut next = Next::terminal(terminal);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Stage names in pipeline order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|m| m.name()).collect()
    }

    /// Number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, middleware: impl Middleware) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Freezes the stage list.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline { stages: self.stages }
    }

    /// Freezes the stage list, failing if two stages share a name.
    pub fn try_build(self) -> CourierResult<Pipeline> {
        let names: Vec<&str> = self.stages.iter().map(|m| m.name()).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(CourierError::config(format!("pipeline stage \"{name}\" added twice")));
            }
        }
        Ok(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnTerminal;
    use courier_core::{BoxFuture, Message};
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        short_circuit: bool,
    }

    impl Middleware for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut DispatchContext,
            envelope: Envelope,
            next: Next<'a>,
        ) -> BoxFuture<'a, DispatchResult> {
            Box::pin(async move {
                self.log.lock().push(format!("{}:before", self.name));
                if self.short_circuit {
                    return Ok(envelope);
                }
                let result = next.run(ctx, envelope).await;
                self.log.lock().push(format!("{}:after", self.name));
                result
            })
        }
    }

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<String>>>, short_circuit: bool) -> Recording {
        Recording {
            name,
            log: Arc::clone(log),
            short_circuit,
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order_around_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(recording("a", &log, false))
            .stage(recording("b", &log, false))
            .build();

        let terminal_log = Arc::clone(&log);
        let terminal = FnTerminal::new(move |envelope: Envelope| {
            terminal_log.lock().push("terminal".to_string());
            async move { Ok::<_, CourierError>(envelope) }
        });

        let mut ctx = DispatchContext::new("bus", "Ping");
        pipeline
            .dispatch(&mut ctx, Envelope::new(Message::new("Ping", json!({}))), &terminal)
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "terminal", "b:after", "a:after"]
        );
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(recording("a", &log, true))
            .stage(recording("b", &log, false))
            .build();
        let terminal = FnTerminal::new(|_: Envelope| async move { Err::<Envelope, _>(CourierError::logic("unreachable")) });

        let mut ctx = DispatchContext::new("bus", "Ping");
        let out = pipeline
            .dispatch(&mut ctx, Envelope::new(Message::new("Ping", json!({}))), &terminal)
            .await;
        assert!(out.is_ok());
        assert_eq!(*log.lock(), vec!["a:before"]);
    }

    #[test]
    fn test_duplicate_stage_names_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = Pipeline::builder()
            .stage(recording("a", &log, false))
            .stage(recording("a", &log, false))
            .try_build()
            .unwrap_err();
        assert!(err.to_string().contains("added twice"));
    }

    #[test]
    fn test_standard_stage_order() {
        let names: Vec<&str> = Stage::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names.first(), Some(&"logging"));
        assert_eq!(names.last(), Some(&"send"));
        assert!(Stage::Security < Stage::Deduplicate);
        assert!(Stage::Transaction < Stage::Send);
    }
}
