//! # Courier Transport
//!
//! Moves envelopes between processes.
//!
//! - [`Transport`] - the polymorphic send/get/ack/reject boundary, with opt-in
//!   capabilities ([`MessageCountAware`], [`BacklogInspector`], [`SetupableTransport`])
//! - [`WorkQueueTransport`] - a transport over a stream broker with work-queue
//!   retention (each message goes to exactly one consumer, then is removed)
//! - [`InMemoryTransport`] - an in-process queue, useful for tests and
//!   single-process deployments
//! - [`MemoryBroker`] - an in-process [`StreamBroker`] honoring work-queue
//!   retention and message-id deduplication
//! - [`JsonSerializer`] - the wire codec (JSON body plus string headers)
//!
//! ## Connection strings
//!
//! ```text
//! nats://localhost:4222?stream=jobs&batch=20
//! in-memory://
//! ```
//!
//! The broker transport refuses to be constructed without a `stream` parameter.

#![doc(html_root_url = "https://docs.rs/courier-transport/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod broker;
pub mod dsn;
pub mod factory;
pub mod in_memory;
pub mod memory_broker;
pub mod registry;
pub mod serializer;
pub mod transport;
pub mod work_queue;

pub use broker::{BrokerConnector, BrokerMessage, PublishAck, StreamBroker, StreamConfig, StreamInfo};
pub use dsn::Dsn;
pub use factory::{InMemoryTransportFactory, TransportFactories, TransportFactory, WorkQueueTransportFactory};
pub use in_memory::InMemoryTransport;
pub use memory_broker::MemoryBroker;
pub use registry::TransportRegistry;
pub use serializer::{EncodedEnvelope, JsonSerializer, Serializer};
pub use transport::{BacklogInspector, MessageCountAware, SetupableTransport, Transport};
pub use work_queue::WorkQueueTransport;
