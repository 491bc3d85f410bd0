//! Typed envelope metadata.
//!
//! Every piece of metadata attached to an [`Envelope`](crate::Envelope) is a
//! [`Stamp`]. Stamps are grouped by [`StampKind`]; a kind may be attached zero,
//! one or many times. The concrete stamp structs implement [`StampType`] so
//! that lookups are typed:
//!
//! ```
//! use courier_core::{Envelope, Message};
//! use courier_core::stamp::{HandledStamp, ReceivedStamp};
//!
//! let envelope = Envelope::new(Message::new("Ping", serde_json::Value::Null))
//!     .with(HandledStamp::new(serde_json::json!(1), "first"))
//!     .with(HandledStamp::new(serde_json::json!(2), "second"));
//!
//! assert_eq!(envelope.all::<HandledStamp>().len(), 2);
//! assert_eq!(envelope.last::<HandledStamp>().unwrap().handler_name, "second");
//! assert!(envelope.last::<ReceivedStamp>().is_none());
//! ```

use crate::error::{CourierError, CourierResult};
use crate::identity::Principal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// The declared type of a stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StampKind {
    /// [`SentStamp`]
    Sent,
    /// [`ReceivedStamp`]
    Received,
    /// [`TransportMessageIdStamp`]
    TransportMessageId,
    /// [`OriginTransportMessageIdStamp`]
    OriginTransportMessageId,
    /// [`ConsumedByWorkerStamp`]
    ConsumedByWorker,
    /// [`HandledStamp`]
    Handled,
    /// [`SecurityStamp`]
    Security,
    /// [`DeduplicateStamp`]
    Deduplicate,
    /// [`TransactionalStamp`]
    Transactional,
    /// [`RejectDelayStamp`]
    RejectDelay,
    /// [`BusNameStamp`]
    BusName,
}

impl StampKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Sent,
        Self::Received,
        Self::TransportMessageId,
        Self::OriginTransportMessageId,
        Self::ConsumedByWorker,
        Self::Handled,
        Self::Security,
        Self::Deduplicate,
        Self::Transactional,
        Self::RejectDelay,
        Self::BusName,
    ];

    /// Returns the stable name of the kind, used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sent => "SentStamp",
            Self::Received => "ReceivedStamp",
            Self::TransportMessageId => "TransportMessageIdStamp",
            Self::OriginTransportMessageId => "OriginTransportMessageIdStamp",
            Self::ConsumedByWorker => "ConsumedByWorkerStamp",
            Self::Handled => "HandledStamp",
            Self::Security => "SecurityStamp",
            Self::Deduplicate => "DeduplicateStamp",
            Self::Transactional => "TransactionalStamp",
            Self::RejectDelay => "RejectDelayStamp",
            Self::BusName => "BusNameStamp",
        }
    }

    /// Looks a kind up by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Returns true if stamps of this kind survive serialization.
    ///
    /// Receive-side and per-process stamps are stripped before a message is
    /// handed to a transport.
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        !matches!(
            self,
            Self::Received | Self::TransportMessageId | Self::ConsumedByWorker | Self::Handled
        )
    }
}

impl std::fmt::Display for StampKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which logical route a message was sent via.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentStamp {
    /// The sender (transport) alias.
    pub sender_alias: String,
}

impl SentStamp {
    /// Creates a sent stamp.
    #[must_use]
    pub fn new(sender_alias: impl Into<String>) -> Self {
        Self {
            sender_alias: sender_alias.into(),
        }
    }
}

/// Which physical transport yielded an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedStamp {
    /// The transport name.
    pub transport_name: String,
}

impl ReceivedStamp {
    /// Creates a received stamp.
    #[must_use]
    pub fn new(transport_name: impl Into<String>) -> Self {
        Self {
            transport_name: transport_name.into(),
        }
    }
}

/// Identity assigned by a transport on send or receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessageIdStamp {
    /// The transport-assigned id.
    pub id: String,
}

impl TransportMessageIdStamp {
    /// Creates a transport message id stamp.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Id of the received envelope whose handling caused this dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginTransportMessageIdStamp {
    /// The causing envelope's transport id, `None` outside of a consumer.
    pub id: Option<String>,
}

impl OriginTransportMessageIdStamp {
    /// Creates an origin stamp.
    #[must_use]
    pub fn new(id: Option<String>) -> Self {
        Self { id }
    }
}

/// Marks an envelope as being processed by a background consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedByWorkerStamp;

/// One handler invocation and its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandledStamp {
    /// The value returned by the handler.
    pub result: Value,
    /// The handler identifier.
    pub handler_name: String,
}

impl HandledStamp {
    /// Creates a handled stamp.
    #[must_use]
    pub fn new(result: Value, handler_name: impl Into<String>) -> Self {
        Self {
            result,
            handler_name: handler_name.into(),
        }
    }
}

/// Snapshot of the authenticated identity active for a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityStamp {
    /// The principal, `None` for anonymous dispatches.
    pub principal: Option<Principal>,
    /// The identity provider the principal resolves against.
    pub provider_id: Option<String>,
}

impl SecurityStamp {
    /// Creates a security stamp.
    #[must_use]
    pub fn new(principal: Option<Principal>, provider_id: Option<String>) -> Self {
        Self {
            principal,
            provider_id,
        }
    }
}

/// Message-type idempotency intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicateStamp {
    /// Whether deduplication applies.
    pub enabled: bool,
}

impl DeduplicateStamp {
    /// Creates a deduplicate stamp.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

/// Message-type transactional-boundary intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionalStamp {
    /// Whether a transaction should surround handling.
    pub enabled: bool,
    /// The transactional resource name, `None` for the default resource.
    pub resource: Option<String>,
}

impl TransactionalStamp {
    /// Creates a transactional stamp.
    #[must_use]
    pub fn new(enabled: bool, resource: Option<String>) -> Self {
        Self { enabled, resource }
    }
}

/// Redelivery backoff computed after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectDelayStamp {
    /// Delay in milliseconds.
    pub delay_ms: u64,
}

impl RejectDelayStamp {
    /// Creates a delay stamp from a duration.
    #[must_use]
    pub fn from_duration(delay: Duration) -> Self {
        Self {
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the delay as a duration.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Which bus dispatched an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusNameStamp {
    /// The bus name.
    pub bus_name: String,
}

impl BusNameStamp {
    /// Creates a bus name stamp.
    #[must_use]
    pub fn new(bus_name: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
        }
    }
}

/// A single piece of envelope metadata.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Stamp {
    Sent(SentStamp),
    Received(ReceivedStamp),
    TransportMessageId(TransportMessageIdStamp),
    OriginTransportMessageId(OriginTransportMessageIdStamp),
    ConsumedByWorker(ConsumedByWorkerStamp),
    Handled(HandledStamp),
    Security(SecurityStamp),
    Deduplicate(DeduplicateStamp),
    Transactional(TransactionalStamp),
    RejectDelay(RejectDelayStamp),
    BusName(BusNameStamp),
}

impl Stamp {
    /// Returns the kind of this stamp.
    #[must_use]
    pub const fn kind(&self) -> StampKind {
        match self {
            Self::Sent(_) => StampKind::Sent,
            Self::Received(_) => StampKind::Received,
            Self::TransportMessageId(_) => StampKind::TransportMessageId,
            Self::OriginTransportMessageId(_) => StampKind::OriginTransportMessageId,
            Self::ConsumedByWorker(_) => StampKind::ConsumedByWorker,
            Self::Handled(_) => StampKind::Handled,
            Self::Security(_) => StampKind::Security,
            Self::Deduplicate(_) => StampKind::Deduplicate,
            Self::Transactional(_) => StampKind::Transactional,
            Self::RejectDelay(_) => StampKind::RejectDelay,
            Self::BusName(_) => StampKind::BusName,
        }
    }

    /// Serializes the stamp body (without its kind).
    pub fn to_value(&self) -> CourierResult<Value> {
        let value = match self {
            Self::Sent(s) => serde_json::to_value(s),
            Self::Received(s) => serde_json::to_value(s),
            Self::TransportMessageId(s) => serde_json::to_value(s),
            Self::OriginTransportMessageId(s) => serde_json::to_value(s),
            Self::ConsumedByWorker(s) => serde_json::to_value(s),
            Self::Handled(s) => serde_json::to_value(s),
            Self::Security(s) => serde_json::to_value(s),
            Self::Deduplicate(s) => serde_json::to_value(s),
            Self::Transactional(s) => serde_json::to_value(s),
            Self::RejectDelay(s) => serde_json::to_value(s),
            Self::BusName(s) => serde_json::to_value(s),
        };
        value.map_err(|e| {
            CourierError::serialization_with_source(format!("cannot encode {}", self.kind()), e)
        })
    }

    /// Deserializes a stamp body of the given kind.
    pub fn from_value(kind: StampKind, value: Value) -> CourierResult<Self> {
        fn decode<T: serde::de::DeserializeOwned>(kind: StampKind, value: Value) -> CourierResult<T> {
            serde_json::from_value(value).map_err(|e| {
                CourierError::serialization_with_source(format!("cannot decode {kind}"), e)
            })
        }

        Ok(match kind {
            StampKind::Sent => Self::Sent(decode(kind, value)?),
            StampKind::Received => Self::Received(decode(kind, value)?),
            StampKind::TransportMessageId => Self::TransportMessageId(decode(kind, value)?),
            StampKind::OriginTransportMessageId => {
                Self::OriginTransportMessageId(decode(kind, value)?)
            }
            StampKind::ConsumedByWorker => Self::ConsumedByWorker(decode(kind, value)?),
            StampKind::Handled => Self::Handled(decode(kind, value)?),
            StampKind::Security => Self::Security(decode(kind, value)?),
            StampKind::Deduplicate => Self::Deduplicate(decode(kind, value)?),
            StampKind::Transactional => Self::Transactional(decode(kind, value)?),
            StampKind::RejectDelay => Self::RejectDelay(decode(kind, value)?),
            StampKind::BusName => Self::BusName(decode(kind, value)?),
        })
    }
}

/// A concrete stamp struct that can be looked up on an envelope by type.
pub trait StampType: Clone + Into<Stamp> + Send + Sync + 'static {
    /// The kind this type is stored under.
    const KIND: StampKind;

    /// Borrows the concrete stamp if `stamp` is of this type.
    fn from_stamp(stamp: &Stamp) -> Option<&Self>;
}

macro_rules! stamp_type {
    ($($ty:ident => $variant:ident),+ $(,)?) => {
        $(
            impl StampType for $ty {
                const KIND: StampKind = StampKind::$variant;

                fn from_stamp(stamp: &Stamp) -> Option<&Self> {
                    match stamp {
                        Stamp::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Stamp {
                fn from(stamp: $ty) -> Self {
                    Self::$variant(stamp)
                }
            }
        )+
    };
}

stamp_type! {
    SentStamp => Sent,
    ReceivedStamp => Received,
    TransportMessageIdStamp => TransportMessageId,
    OriginTransportMessageIdStamp => OriginTransportMessageId,
    ConsumedByWorkerStamp => ConsumedByWorker,
    HandledStamp => Handled,
    SecurityStamp => Security,
    DeduplicateStamp => Deduplicate,
    TransactionalStamp => Transactional,
    RejectDelayStamp => RejectDelay,
    BusNameStamp => BusName,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in StampKind::ALL {
            assert_eq!(StampKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(StampKind::from_name("NopeStamp"), None);
    }

    #[test]
    fn test_sendable_kinds() {
        assert!(StampKind::Sent.is_sendable());
        assert!(StampKind::Security.is_sendable());
        assert!(!StampKind::Received.is_sendable());
        assert!(!StampKind::Handled.is_sendable());
        assert!(!StampKind::ConsumedByWorker.is_sendable());
    }

    #[test]
    fn test_stamp_value_roundtrip() {
        let stamp: Stamp = SecurityStamp::new(Some(Principal::new("alice")), Some("main".into())).into();
        let value = stamp.to_value().unwrap();
        assert_eq!(value["provider_id"], json!("main"));
        assert_eq!(Stamp::from_value(StampKind::Security, value).unwrap(), stamp);
    }

    #[test]
    fn test_from_value_rejects_mismatched_body() {
        let err = Stamp::from_value(StampKind::RejectDelay, json!({"delay_ms": "soon"})).unwrap_err();
        assert!(err.to_string().contains("RejectDelayStamp"));
    }

    #[test]
    fn test_reject_delay_duration() {
        let stamp = RejectDelayStamp::from_duration(Duration::from_secs(3));
        assert_eq!(stamp.delay_ms, 3000);
        assert_eq!(stamp.delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_from_stamp_is_typed() {
        let stamp: Stamp = ReceivedStamp::new("async").into();
        assert!(ReceivedStamp::from_stamp(&stamp).is_some());
        assert!(SentStamp::from_stamp(&stamp).is_none());
    }
}
