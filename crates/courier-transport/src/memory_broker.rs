//! In-process stream broker.
//!
//! [`MemoryBroker`] implements [`StreamBroker`] over plain collections:
//!
//! - work-queue streams drop a message as soon as it is fetched
//! - publishes carrying a [`MSG_ID_HEADER`] already seen by the stream are
//!   acknowledged as duplicates and not stored
//! - [`set_available`](MemoryBroker::set_available) simulates an outage, making
//!   every call fail until the broker comes back
//!
//! It also implements [`BrokerConnector`], handing out itself, so a transport
//! can be wired to it directly.

use crate::broker::{
    BrokerConnector, BrokerMessage, FetchRequest, PublishAck, RetentionPolicy, StreamBroker, StreamConfig, StreamInfo,
    MSG_ID_HEADER,
};
use crate::dsn::Dsn;
use bytes::Bytes;
use courier_core::{BoxError, BoxFuture};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const DEDUPE_WINDOW: usize = 10_000;

#[derive(Debug)]
struct StoredMessage {
    sequence: u64,
    subject: String,
    headers: BTreeMap<String, String>,
    payload: Bytes,
}

#[derive(Debug)]
struct Stream {
    config: StreamConfig,
    messages: VecDeque<StoredMessage>,
    seen_ids: IndexSet<String>,
    last_sequence: u64,
}

impl Stream {
    fn captures(&self, subject: &str) -> bool {
        self.config.subjects.iter().any(|pattern| subject_matches(pattern, subject))
    }

    fn info(&self) -> StreamInfo {
        let mut subjects: IndexMap<String, u64> = IndexMap::new();
        for message in &self.messages {
            *subjects.entry(message.subject.clone()).or_insert(0) += 1;
        }
        StreamInfo {
            config: self.config.clone(),
            messages: self.messages.len() as u64,
            subjects,
        }
    }
}

fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// An in-process [`StreamBroker`].
#[derive(Debug, Default)]
pub struct MemoryBroker {
    streams: Mutex<IndexMap<String, Stream>>,
    unavailable: AtomicBool,
    connections: AtomicUsize,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the broker reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Returns how many times a client was handed out.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Returns the number of stored messages in `stream`, `0` if absent.
    #[must_use]
    pub fn stored(&self, stream: &str) -> usize {
        self.streams.lock().get(stream).map_or(0, |s| s.messages.len())
    }

    fn check_available(&self) -> Result<(), BoxError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "broker unavailable")));
        }
        Ok(())
    }

    fn publish_now(
        &self,
        subject: &str,
        headers: BTreeMap<String, String>,
        payload: Bytes,
    ) -> Result<PublishAck, BoxError> {
        self.check_available()?;
        let mut streams = self.streams.lock();
        let stream = streams
            .values_mut()
            .find(|stream| stream.captures(subject))
            .ok_or_else(|| -> BoxError { format!("no stream captures subject \"{subject}\"").into() })?;

        if let Some(id) = headers.get(MSG_ID_HEADER) {
            if stream.seen_ids.contains(id) {
                return Ok(PublishAck {
                    sequence: stream.last_sequence,
                    duplicate: true,
                });
            }
            if stream.seen_ids.len() >= DEDUPE_WINDOW {
                stream.seen_ids.shift_remove_index(0);
            }
            stream.seen_ids.insert(id.clone());
        }

        stream.last_sequence += 1;
        let sequence = stream.last_sequence;
        stream.messages.push_back(StoredMessage {
            sequence,
            subject: subject.to_string(),
            headers,
            payload,
        });
        Ok(PublishAck {
            sequence,
            duplicate: false,
        })
    }

    fn fetch_now(&self, stream_name: &str, request: &FetchRequest) -> Result<Vec<BrokerMessage>, BoxError> {
        self.check_available()?;
        let mut streams = self.streams.lock();
        let stream = streams
            .get_mut(stream_name)
            .ok_or_else(|| -> BoxError { format!("stream \"{stream_name}\" not found").into() })?;

        let take = request.batch.min(stream.messages.len());
        let fetched: Vec<&StoredMessage> = stream.messages.iter().take(take).collect();
        let delivered = fetched
            .iter()
            .map(|message| BrokerMessage {
                subject: message.subject.clone(),
                headers: message.headers.clone(),
                payload: message.payload.clone(),
                delivery_id: format!("{stream_name}:{}", message.sequence),
            })
            .collect();

        if stream.config.retention == RetentionPolicy::WorkQueue {
            stream.messages.drain(..take);
        }
        Ok(delivered)
    }
}

impl StreamBroker for MemoryBroker {
    fn ping(&self) -> BoxFuture<'_, Result<(), BoxError>> {
        let result = self.check_available();
        Box::pin(async move { result })
    }

    fn stream_info<'a>(&'a self, stream: &'a str) -> BoxFuture<'a, Result<Option<StreamInfo>, BoxError>> {
        let result = self
            .check_available()
            .map(|()| self.streams.lock().get(stream).map(Stream::info));
        Box::pin(async move { result })
    }

    fn create_stream(&self, config: StreamConfig) -> BoxFuture<'_, Result<(), BoxError>> {
        let result = self.check_available().and_then(|()| {
            let mut streams = self.streams.lock();
            if streams.contains_key(&config.name) {
                return Err(format!("stream \"{}\" already exists", config.name).into());
            }
            streams.insert(
                config.name.clone(),
                Stream {
                    config,
                    messages: VecDeque::new(),
                    seen_ids: IndexSet::new(),
                    last_sequence: 0,
                },
            );
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn publish<'a>(
        &'a self,
        subject: &'a str,
        headers: BTreeMap<String, String>,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<PublishAck, BoxError>> {
        let result = self.publish_now(subject, headers, payload);
        Box::pin(async move { result })
    }

    fn fetch<'a>(
        &'a self,
        stream: &'a str,
        request: FetchRequest,
    ) -> BoxFuture<'a, Result<Vec<BrokerMessage>, BoxError>> {
        let result = self.fetch_now(stream, &request);
        Box::pin(async move { result })
    }
}

impl BrokerConnector for Arc<MemoryBroker> {
    fn connect<'a>(&'a self, _dsn: &'a Dsn) -> BoxFuture<'a, Result<Arc<dyn StreamBroker>, BoxError>> {
        let result = self.check_available().map(|()| {
            self.connections.fetch_add(1, Ordering::SeqCst);
            Arc::clone(self) as Arc<dyn StreamBroker>
        });
        Box::pin(async move { result })
    }
}
