//! # Courier Core
//!
//! Core types and traits for the Courier message bus.
//!
//! This crate provides the foundational types used throughout Courier:
//!
//! - [`Message`] - A named, serializable message payload
//! - [`Envelope`] - A message plus its ordered, typed [`Stamp`] metadata
//! - [`CourierError`] - Standard error type with [`ErrorCategory`] classification
//! - [`Counter`] - Atomic keyed counters used for backlog accounting
//! - [`RoutingTable`] - Static message-to-transport mapping built at startup
//! - [`HandlerResolver`], [`CacheStore`], [`UserProvider`], [`TransactionManager`] -
//!   the narrow seams through which external collaborators are consumed
//!
//! ## Envelopes are immutable
//!
//! ```
//! use courier_core::{Envelope, Message, stamp::SentStamp};
//!
//! let envelope = Envelope::new(Message::new("Ping", serde_json::json!({})));
//! let sent = envelope.with(SentStamp::new("async"));
//!
//! assert!(envelope.last::<SentStamp>().is_none());
//! assert_eq!(sent.last::<SentStamp>().unwrap().sender_alias, "async");
//! ```

#![doc(html_root_url = "https://docs.rs/courier-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod counter;
mod envelope;
mod error;
pub mod handler;
pub mod identity;
mod message;
pub mod retry;
pub mod routing;
pub mod stamp;
pub mod transaction;

use std::future::Future;
use std::pin::Pin;

pub use cache::{CacheItem, CacheStore, InMemoryCacheStore};
pub use counter::{backlog_key, Counter, InMemoryCounter};
pub use envelope::Envelope;
pub use error::{BoxError, CourierError, CourierResult, ErrorCategory, HandlerFailure, HttpStatusError};
pub use handler::{HandlerOutcome, HandlerRegistry, HandlerResolver};
pub use identity::{FirewallResolver, Principal, SecurityContext, User, UserProvider};
pub use message::{Message, MessageType};
pub use retry::redelivery_delay;
pub use routing::{CachePolicy, MessageRoute, RoutingTable, RoutingTableBuilder};
pub use stamp::{Stamp, StampKind, StampType};
pub use transaction::TransactionManager;

/// A boxed, sendable future.
///
/// Used at every async trait seam in Courier so that traits stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
