//! Standard middleware stages.
//!
//! In dispatch order:
//!
//! 1. [`logging`] - dispatch span, logs and metrics
//! 2. [`origin`] - origin transport message tracking
//! 3. [`security`] - principal propagation
//! 4. [`metadata`] - routing-declared stamps
//! 5. [`deduplicate`] - in-flight deduplication
//! 6. [`backlog`] - backlog accounting on receipt
//! 7. [`cache`] - cached query results and tag invalidation
//! 8. [`transaction`] - transactional handling
//! 9. [`send`] - sending to transports
//!
//! The chain ends in [`handle`], which runs the message handlers.

pub mod backlog;
pub mod cache;
pub mod deduplicate;
pub mod handle;
pub mod logging;
pub mod metadata;
pub mod origin;
pub mod security;
pub mod send;
pub mod transaction;

pub use backlog::BacklogMiddleware;
pub use cache::CacheMiddleware;
pub use deduplicate::DeduplicationMiddleware;
pub use handle::HandleMessage;
pub use logging::DispatchLoggingMiddleware;
pub use metadata::MessageMetadataMiddleware;
pub use origin::OriginMiddleware;
pub use security::SecurityMiddleware;
pub use send::SendMessageMiddleware;
pub use transaction::TransactionMiddleware;
