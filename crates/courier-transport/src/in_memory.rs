//! In-process transport.
//!
//! Envelopes are kept in a queue inside the process. Acknowledged and
//! rejected envelopes are recorded so tests can assert on them.

use crate::transport::{MessageCountAware, Transport};
use courier_core::stamp::TransportMessageIdStamp;
use courier_core::{BoxFuture, CourierResult, Envelope};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Envelopes returned per `get` unless configured otherwise.
const DEFAULT_BATCH: usize = 10;

/// A queue living in process memory.
#[derive(Debug)]
pub struct InMemoryTransport {
    queue: Mutex<VecDeque<Envelope>>,
    sent: Mutex<Vec<Envelope>>,
    acked: Mutex<Vec<Envelope>>,
    rejected: Mutex<Vec<Envelope>>,
    next_id: AtomicU64,
    batch: usize,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::with_batch(DEFAULT_BATCH)
    }
}

impl InMemoryTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty transport returning at most `batch` envelopes per `get`.
    #[must_use]
    pub fn with_batch(batch: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
            rejected: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            batch: batch.max(1),
        }
    }

    /// Every envelope sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    /// Every envelope acknowledged so far.
    #[must_use]
    pub fn acknowledged(&self) -> Vec<Envelope> {
        self.acked.lock().clone()
    }

    /// Every envelope rejected so far.
    #[must_use]
    pub fn rejected(&self) -> Vec<Envelope> {
        self.rejected.lock().clone()
    }

    /// Number of envelopes waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Drops every waiting and recorded envelope.
    pub fn reset(&self) {
        self.queue.lock().clear();
        self.sent.lock().clear();
        self.acked.lock().clear();
        self.rejected.lock().clear();
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, envelope: Envelope) -> BoxFuture<'_, CourierResult<Envelope>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sent = envelope.with(TransportMessageIdStamp::new(id.to_string()));
        self.queue.lock().push_back(sent.clone());
        self.sent.lock().push(sent.clone());
        Box::pin(async move { Ok(sent) })
    }

    fn get(&self) -> BoxFuture<'_, CourierResult<Vec<Envelope>>> {
        let taken: Vec<Envelope> = {
            let mut queue = self.queue.lock();
            let take = self.batch.min(queue.len());
            queue.drain(..take).collect()
        };
        Box::pin(async move { Ok(taken) })
    }

    fn ack<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, CourierResult<()>> {
        self.acked.lock().push(envelope.clone());
        Box::pin(async { Ok(()) })
    }

    fn reject<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, CourierResult<()>> {
        self.rejected.lock().push(envelope.clone());
        Box::pin(async { Ok(()) })
    }

    fn message_counter(&self) -> Option<&dyn MessageCountAware> {
        Some(self)
    }
}

impl MessageCountAware for InMemoryTransport {
    fn message_count(&self) -> BoxFuture<'_, CourierResult<u64>> {
        let count = self.len() as u64;
        Box::pin(async move { Ok(count) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Message;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_then_get() {
        let transport = InMemoryTransport::new();
        let sent = transport.send(Envelope::new(Message::new("A", json!(1)))).await.unwrap();
        assert_eq!(sent.last::<TransportMessageIdStamp>().unwrap().id, "1");
        assert_eq!(transport.message_count().await.unwrap(), 1);

        let got = transport.get().await.unwrap();
        assert_eq!(got.len(), 1);
        assert!(transport.is_empty());
        assert!(transport.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_and_records() {
        let transport = InMemoryTransport::with_batch(2);
        for n in 0..3 {
            transport.send(Envelope::new(Message::new("A", json!(n)))).await.unwrap();
        }
        let got = transport.get().await.unwrap();
        assert_eq!(got.len(), 2);
        transport.ack(&got[0]).await.unwrap();
        transport.reject(&got[1]).await.unwrap();

        assert_eq!(transport.sent().len(), 3);
        assert_eq!(transport.acknowledged().len(), 1);
        assert_eq!(transport.rejected().len(), 1);
        assert_eq!(transport.len(), 1);

        transport.reset();
        assert!(transport.sent().is_empty());
    }
}
