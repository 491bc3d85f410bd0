//! The transport boundary.
//!
//! A [`Transport`] sends envelopes to, and receives them from, some queue.
//! Optional capabilities are exposed through accessor methods returning
//! `None` by default, so callers query a transport for what it supports
//! instead of guessing at its concrete type.

use courier_core::{BoxFuture, CourierResult, Envelope};
use indexmap::IndexMap;

/// Sends and receives envelopes.
pub trait Transport: Send + Sync {
    /// Sends an envelope and returns it with transport-assigned stamps
    /// (typically a [`TransportMessageIdStamp`](courier_core::stamp::TransportMessageIdStamp)).
    fn send(&self, envelope: Envelope) -> BoxFuture<'_, CourierResult<Envelope>>;

    /// Returns the envelopes immediately available, without blocking.
    ///
    /// An empty vector means nothing is waiting.
    fn get(&self) -> BoxFuture<'_, CourierResult<Vec<Envelope>>>;

    /// Acknowledges an envelope obtained from [`get`](Self::get).
    fn ack<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, CourierResult<()>>;

    /// Rejects an envelope obtained from [`get`](Self::get).
    fn reject<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, CourierResult<()>>;

    /// Returns the message-count capability, if supported.
    fn message_counter(&self) -> Option<&dyn MessageCountAware> {
        None
    }

    /// Returns the per-message-type backlog capability, if supported.
    fn backlog_inspector(&self) -> Option<&dyn BacklogInspector> {
        None
    }

    /// Returns the setup capability, if supported.
    fn setupable(&self) -> Option<&dyn SetupableTransport> {
        None
    }
}

/// Reports how many messages are waiting on a transport.
pub trait MessageCountAware: Send + Sync {
    /// Returns the number of waiting messages.
    fn message_count(&self) -> BoxFuture<'_, CourierResult<u64>>;
}

/// Reports waiting messages broken down by message type.
pub trait BacklogInspector: Send + Sync {
    /// Returns `{message type → waiting count}` for every type with at least
    /// one message recorded by the broker.
    fn backlog_by_message(&self) -> BoxFuture<'_, CourierResult<IndexMap<String, u64>>>;
}

/// Creates whatever broker-side structures the transport needs.
pub trait SetupableTransport: Send + Sync {
    /// Idempotently prepares the transport.
    fn setup(&self) -> BoxFuture<'_, CourierResult<()>>;
}
