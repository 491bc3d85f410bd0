//! Message payloads.
//!
//! A [`Message`] is the unit of work carried by an [`Envelope`](crate::Envelope).
//! It pairs a type name, used for routing and accounting, with a JSON payload
//! so that it can cross process boundaries unchanged.

use crate::error::{CourierError, CourierResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};

/// A strongly-typed message that can be converted to and from a [`Message`].
///
/// # Example
///
/// ```
/// use courier_core::{Message, MessageType};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct SendInvoice {
///     invoice_id: u64,
/// }
///
/// impl MessageType for SendInvoice {
///     const NAME: &'static str = "SendInvoice";
/// }
///
/// let message = Message::from_typed(&SendInvoice { invoice_id: 7 }).unwrap();
/// assert_eq!(message.name(), "SendInvoice");
/// assert_eq!(message.to_typed::<SendInvoice>().unwrap().invoice_id, 7);
/// ```
pub trait MessageType: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The message type name used for routing.
    const NAME: &'static str;
}

/// A named message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    name: String,
    payload: Value,
}

impl Message {
    /// Creates a message from a type name and a JSON payload.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Serializes a typed message.
    pub fn from_typed<T: MessageType>(message: &T) -> CourierResult<Self> {
        let payload = serde_json::to_value(message).map_err(|e| {
            CourierError::serialization_with_source(format!("cannot serialize {}", T::NAME), e)
        })?;
        Ok(Self::new(T::NAME, payload))
    }

    /// Deserializes the payload into a typed message.
    ///
    /// Fails if the message name does not match `T::NAME`.
    pub fn to_typed<T: MessageType>(&self) -> CourierResult<T> {
        if self.name != T::NAME {
            return Err(CourierError::serialization(format!(
                "message \"{}\" cannot be read as \"{}\"",
                self.name,
                T::NAME
            )));
        }
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            CourierError::serialization_with_source(format!("cannot deserialize {}", T::NAME), e)
        })
    }

    /// Returns the message type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the JSON payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns a stable content hash of the name and payload (hex SHA-1).
    ///
    /// Object keys are serialized in sorted order, so two payloads with the
    /// same content always produce the same fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    impl MessageType for Ping {
        const NAME: &'static str = "Ping";
    }

    #[test]
    fn test_typed_roundtrip() {
        let message = Message::from_typed(&Ping { seq: 3 }).unwrap();
        assert_eq!(message.name(), "Ping");
        assert_eq!(message.payload(), &json!({"seq": 3}));
        assert_eq!(message.to_typed::<Ping>().unwrap(), Ping { seq: 3 });
    }

    #[test]
    fn test_to_typed_rejects_other_names() {
        let message = Message::new("Pong", json!({"seq": 1}));
        let err = message.to_typed::<Ping>().unwrap_err();
        assert!(err.to_string().contains("\"Pong\""));
    }

    #[test]
    fn test_fingerprint_is_content_based() {
        let a = Message::new("Ping", json!({"a": 1, "b": [true, null]}));
        let b = Message::new("Ping", json!({"b": [true, null], "a": 1}));
        let c = Message::new("Pong", json!({"a": 1, "b": [true, null]}));

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 40);
    }
}
