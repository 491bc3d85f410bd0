//! Wire codec for envelopes.
//!
//! An envelope is encoded as:
//!
//! - a body holding the JSON message payload
//! - a `type` header naming the message
//! - one `X-Message-Stamp-{Kind}` header per sendable stamp kind, holding a
//!   JSON array of that kind's stamps in insertion order
//!
//! Stamps that only make sense inside one process (received, handled,
//! transport id, consumed-by-worker) are never encoded.

use bytes::Bytes;
use courier_core::{CourierError, CourierResult, Envelope, Message, Stamp, StampKind};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Header naming the message type.
pub const TYPE_HEADER: &str = "type";
/// Header carrying the body content type.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
/// Prefix of the per-kind stamp headers.
pub const STAMP_HEADER_PREFIX: &str = "X-Message-Stamp-";

const JSON_CONTENT_TYPE: &str = "application/json";

/// An encoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEnvelope {
    /// The message body.
    pub body: Bytes,
    /// String headers.
    pub headers: BTreeMap<String, String>,
}

/// Encodes and decodes envelopes for transports.
pub trait Serializer: Send + Sync {
    /// Encodes an envelope.
    fn encode(&self, envelope: &Envelope) -> CourierResult<EncodedEnvelope>;

    /// Decodes an envelope.
    fn decode(&self, encoded: &EncodedEnvelope) -> CourierResult<Envelope>;
}

/// The JSON wire codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Creates the codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn encode(&self, envelope: &Envelope) -> CourierResult<EncodedEnvelope> {
        let body = serde_json::to_vec(envelope.message().payload())
            .map_err(|e| CourierError::serialization_with_source("cannot encode message payload", e))?;

        let mut headers = BTreeMap::new();
        headers.insert(TYPE_HEADER.to_string(), envelope.message_name().to_string());
        headers.insert(CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string());

        for kind in envelope.kinds().filter(|kind| kind.is_sendable()) {
            let values = envelope
                .stamps_of(kind)
                .iter()
                .map(Stamp::to_value)
                .collect::<CourierResult<Vec<_>>>()?;
            let encoded = serde_json::to_string(&values)
                .map_err(|e| CourierError::serialization_with_source(format!("cannot encode {kind} stamps"), e))?;
            headers.insert(format!("{STAMP_HEADER_PREFIX}{}", kind.name()), encoded);
        }

        Ok(EncodedEnvelope {
            body: Bytes::from(body),
            headers,
        })
    }

    fn decode(&self, encoded: &EncodedEnvelope) -> CourierResult<Envelope> {
        let name = encoded
            .headers
            .get(TYPE_HEADER)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CourierError::serialization("encoded envelope has no \"type\" header"))?;

        let payload: Value = serde_json::from_slice(&encoded.body)
            .map_err(|e| CourierError::serialization_with_source(format!("cannot decode payload of \"{name}\""), e))?;

        let mut stamps = Vec::new();
        for (header, value) in &encoded.headers {
            let Some(kind_name) = header.strip_prefix(STAMP_HEADER_PREFIX) else {
                continue;
            };
            let Some(kind) = StampKind::from_name(kind_name) else {
                warn!(header = %header, "ignoring unknown stamp header");
                continue;
            };
            let values: Vec<Value> = serde_json::from_str(value)
                .map_err(|e| CourierError::serialization_with_source(format!("cannot decode {kind} stamps"), e))?;
            for value in values {
                stamps.push(Stamp::from_value(kind, value)?);
            }
        }

        Ok(Envelope::wrap(Message::new(name.clone(), payload), stamps))
    }
}
