//! # Courier Middleware
//!
//! The dispatch pipeline of the Courier message bus.
//!
//! Every envelope dispatched on a bus walks an ordered list of middleware
//! stages and ends in a terminal step that runs the message handlers:
//!
//! ```text
//! Envelope → Logging → Origin → Security → Metadata → Deduplicate
//!          → Backlog → Cache → Transaction → Send → [Handle]
//! ```
//!
//! Stages may stop the chain early: the send stage hands routed envelopes to
//! their transports instead of handling them, the deduplication stage drops
//! in-flight duplicates and the cache stage answers queries it has seen.
//!
//! ## Nested dispatch
//!
//! Handlers may dispatch further messages on the same bus. Stages that keep
//! state for the duration of a dispatch (the security context, the origin
//! message, open transactions) hold it in a [`ScopedSlot`]. Each value is
//! scoped to the dispatch future through a tokio task-local: a nested
//! dispatch inherits it, the enclosing value is back however the nested
//! dispatch ends, and concurrent dispatches never see each other's values.
//!
//! ## Example
//!
//! ```
//! use courier_core::stamp::BusNameStamp;
//! use courier_core::{CourierError, Envelope, Message, RoutingTable};
//! use courier_middleware::stages::MessageMetadataMiddleware;
//! use courier_middleware::{DispatchContext, FnTerminal, Pipeline};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder()
//!     .stage(MessageMetadataMiddleware::new(Arc::new(RoutingTable::default())).bus_name("commands"))
//!     .build();
//! let terminal = FnTerminal::new(|envelope: Envelope| async move { Ok::<_, CourierError>(envelope) });
//!
//! let mut ctx = DispatchContext::new("commands", "Ping");
//! let out = pipeline
//!     .dispatch(&mut ctx, Envelope::new(Message::new("Ping", json!({}))), &terminal)
//!     .await
//!     .unwrap();
//! assert_eq!(out.last::<BusNameStamp>().unwrap().bus_name, "commands");
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod slot;
pub mod stages;
pub mod token;

pub use context::{DispatchContext, DispatchId};
pub use middleware::{DispatchResult, FnTerminal, Middleware, Next, Terminal};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder, Stage};
pub use slot::ScopedSlot;
pub use token::TokenStorage;
