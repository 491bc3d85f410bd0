//! Stream broker seam.
//!
//! [`WorkQueueTransport`](crate::WorkQueueTransport) talks to a persistent
//! stream broker (NATS JetStream style) through [`StreamBroker`]. Clients are
//! obtained from a [`BrokerConnector`], which lets the transport drop a dead
//! client and connect again.

use crate::dsn::Dsn;
use bytes::Bytes;
use courier_core::{BoxError, BoxFuture};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Header carrying the broker-side deduplication id.
pub const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// How a stream retains messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Messages are kept until limits are reached.
    Limits,
    /// Each message is delivered to one consumer and removed once fetched.
    WorkQueue,
}

/// Where a stream stores messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Kept in broker memory.
    Memory,
    /// Persisted to disk.
    File,
}

/// Stream declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Stream name.
    pub name: String,
    /// Subjects captured by the stream (`>` matches any remaining tokens).
    pub subjects: Vec<String>,
    /// Retention policy.
    pub retention: RetentionPolicy,
    /// Storage type.
    pub storage: StorageType,
}

impl StreamConfig {
    /// A memory-backed work-queue stream capturing `{name}.>`.
    #[must_use]
    pub fn work_queue(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            subjects: vec![format!("{name}.>")],
            name,
            retention: RetentionPolicy::WorkQueue,
            storage: StorageType::Memory,
        }
    }
}

/// Stream state as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// The stream declaration.
    pub config: StreamConfig,
    /// Total number of stored messages.
    pub messages: u64,
    /// Stored messages per subject.
    pub subjects: IndexMap<String, u64>,
}

/// Acknowledgement of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAck {
    /// The stream sequence of the stored message.
    pub sequence: u64,
    /// True if the broker dropped the message as a duplicate.
    pub duplicate: bool,
}

/// A message fetched from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// The subject it was published on.
    pub subject: String,
    /// Its headers.
    pub headers: BTreeMap<String, String>,
    /// Its body.
    pub payload: Bytes,
    /// The broker's delivery id.
    pub delivery_id: String,
}

/// A pull request against a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Consumer name.
    pub consumer: String,
    /// Maximum number of messages to return.
    pub batch: usize,
    /// Return immediately when nothing is waiting.
    pub no_wait: bool,
}

/// A connected stream broker client.
pub trait StreamBroker: Send + Sync {
    /// Checks that the connection is alive.
    fn ping(&self) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Returns stream state, `None` if the stream does not exist.
    fn stream_info<'a>(&'a self, stream: &'a str) -> BoxFuture<'a, Result<Option<StreamInfo>, BoxError>>;

    /// Creates a stream.
    fn create_stream(&self, config: StreamConfig) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Publishes a message.
    fn publish<'a>(
        &'a self,
        subject: &'a str,
        headers: BTreeMap<String, String>,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<PublishAck, BoxError>>;

    /// Fetches messages from a stream.
    fn fetch<'a>(
        &'a self,
        stream: &'a str,
        request: FetchRequest,
    ) -> BoxFuture<'a, Result<Vec<BrokerMessage>, BoxError>>;
}

/// Opens broker clients.
pub trait BrokerConnector: Send + Sync {
    /// Connects to the broker named by `dsn`.
    fn connect<'a>(&'a self, dsn: &'a Dsn) -> BoxFuture<'a, Result<std::sync::Arc<dyn StreamBroker>, BoxError>>;
}
