//! The envelope: a message plus its stamps.
//!
//! Envelopes are immutable. Every transformation returns a new envelope and
//! leaves the original untouched; within a kind, stamps keep their attachment
//! order.

use crate::message::Message;
use crate::stamp::{Stamp, StampKind, StampType};
use indexmap::IndexMap;
use std::sync::Arc;

/// A message wrapped with ordered, typed metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    message: Arc<Message>,
    stamps: IndexMap<StampKind, Vec<Stamp>>,
}

impl Envelope {
    /// Wraps a message without stamps.
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            message: Arc::new(message),
            stamps: IndexMap::new(),
        }
    }

    /// Wraps a message with an initial set of stamps, attached in order.
    #[must_use]
    pub fn wrap(message: Message, stamps: impl IntoIterator<Item = Stamp>) -> Self {
        Self::new(message).with_all(stamps)
    }

    /// Returns a new envelope with `stamp` appended to its kind's bucket.
    #[must_use]
    pub fn with(&self, stamp: impl Into<Stamp>) -> Self {
        let mut next = self.clone();
        next.push(stamp.into());
        next
    }

    /// Returns a new envelope with every stamp appended in order.
    #[must_use]
    pub fn with_all(&self, stamps: impl IntoIterator<Item = Stamp>) -> Self {
        let mut next = self.clone();
        for stamp in stamps {
            next.push(stamp);
        }
        next
    }

    /// Returns a new envelope without any stamp of type `T`.
    #[must_use]
    pub fn without_all<T: StampType>(&self) -> Self {
        self.without_kind(T::KIND)
    }

    /// Returns a new envelope without any stamp of the given kind.
    #[must_use]
    pub fn without_kind(&self, kind: StampKind) -> Self {
        let mut next = self.clone();
        next.stamps.shift_remove(&kind);
        next
    }

    /// Returns every stamp of type `T` in attachment order.
    #[must_use]
    pub fn all<T: StampType>(&self) -> Vec<&T> {
        self.stamps
            .get(&T::KIND)
            .map(|bucket| bucket.iter().filter_map(T::from_stamp).collect())
            .unwrap_or_default()
    }

    /// Returns the most recently attached stamp of type `T`.
    #[must_use]
    pub fn last<T: StampType>(&self) -> Option<&T> {
        self.stamps
            .get(&T::KIND)
            .and_then(|bucket| bucket.last())
            .and_then(T::from_stamp)
    }

    /// Returns true if at least one stamp of type `T` is attached.
    #[must_use]
    pub fn has<T: StampType>(&self) -> bool {
        self.stamps.get(&T::KIND).is_some_and(|bucket| !bucket.is_empty())
    }

    /// Iterates over all stamps, grouped by kind in first-attachment order.
    pub fn stamps(&self) -> impl Iterator<Item = &Stamp> {
        self.stamps.values().flatten()
    }

    /// Returns the stamps of one kind.
    #[must_use]
    pub fn stamps_of(&self, kind: StampKind) -> &[Stamp] {
        self.stamps.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Returns the kinds present on this envelope.
    pub fn kinds(&self) -> impl Iterator<Item = StampKind> + '_ {
        self.stamps.keys().copied()
    }

    /// Returns the wrapped message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns the wrapped message's type name.
    #[must_use]
    pub fn message_name(&self) -> &str {
        self.message.name()
    }

    fn push(&mut self, stamp: Stamp) {
        self.stamps.entry(stamp.kind()).or_default().push(stamp);
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}
