//! # Courier
//!
//! **Message bus with a middleware pipeline and work-queue transports**
//!
//! Courier dispatches messages through a fixed chain of stages before they
//! reach their handlers or leave for a transport:
//!
//! - 🔒 **Security propagation** – The dispatching principal travels with the message
//! - 📬 **Transports** – Routed messages are sent to in-memory or broker work queues
//! - 📊 **Backlog accounting** – Counters and a monitor report what still waits
//! - 🧾 **Deduplication, caching and transactions** – Declared per message type
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_file("courier.toml")?.with_env_prefix("COURIER").load()?;
//!     let factories = TransportFactories::new().with(InMemoryTransportFactory);
//!
//!     let bus = MessageBus::from_config(&config, &factories)?
//!         .handlers(HandlerRegistry::new().register("Import", "import", |_env| async {
//!             Ok(serde_json::json!("imported"))
//!         }))
//!         .build()?;
//!     bus.setup_transports().await?;
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     Worker::from_config(bus, &config.worker).run(shutdown).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! dispatch → Logging → Origin → Security → Metadata → Deduplicate → Backlog
//!                                                                      ↓
//!            Handle ← Send (routed: stop here) ← Transaction ← Cache ←─┘
//! ```

#![doc(html_root_url = "https://docs.rs/courier/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bus;
pub mod monitor;
pub mod worker;

pub use bus::{MessageBus, MessageBusBuilder};
pub use monitor::{BacklogMonitor, JobRecord};
pub use worker::{PollStats, Worker};

// Re-export core types
pub use courier_core as core;

// Re-export middleware types
pub use courier_middleware as middleware;

// Re-export transport types
pub use courier_transport as transport;

// Re-export configuration types
pub use courier_config as config;

// Re-export telemetry types
pub use courier_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use courier::prelude::*;
///
/// let bus = MessageBus::builder("app.bus").build().unwrap();
/// assert_eq!(bus.name(), "app.bus");
/// ```
pub mod prelude {
    pub use crate::{BacklogMonitor, JobRecord, MessageBus, MessageBusBuilder, PollStats, Worker};

    pub use courier_core::{
        CourierError, CourierResult, Envelope, HandlerRegistry, Message, MessageRoute, RoutingTable,
    };

    // Re-export the stamps handlers look at most
    pub use courier_core::stamp::{HandledStamp, ReceivedStamp, SentStamp};

    pub use courier_config::{ConfigLoader, CourierConfig};

    pub use courier_transport::{
        InMemoryTransport, InMemoryTransportFactory, Transport, TransportFactories, TransportRegistry,
        WorkQueueTransportFactory,
    };

    pub use courier_telemetry::{init_logging, LogConfig};
}
