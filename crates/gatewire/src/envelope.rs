//! # Envelope
//!
//! The single message shape used in both directions:
//! `{ "action": ..., "messageId": ..., "payload": ... }`.
//!
//! ## Invariants
//!
//! - A reply carries the `messageId` of its request, in the same JSON form.
//! - The `action` string is kept verbatim so unknown verbs survive decoding
//!   and the receiver decides what to do with them.

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use serde_json::json;

use crate::action::Action;
use crate::action::Reply;
use crate::error::Error;
use crate::error::Result;
use crate::payload::ErrorPayload;

/// Request correlation id. Peers may use strings or numbers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(u64),
    /// Negative or fractional ids, echoed as received.
    Other(serde_json::Number),
    Text(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Other(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub action: String,
    pub message_id: MessageId,
    #[serde(default)]
    pub payload: Json,
}

impl Envelope {
    /// Builds a request envelope.
    pub fn request(action: Action, message_id: impl Into<MessageId>, payload: Json) -> Self {
        Self {
            action: action.as_str().to_string(),
            message_id: message_id.into(),
            payload,
        }
    }

    /// Builds a reply envelope correlated to `message_id`.
    pub fn reply(reply: Reply, message_id: MessageId, payload: Json) -> Self {
        Self {
            action: reply.as_str().to_string(),
            message_id,
            payload,
        }
    }

    /// Builds the `error` reply, echoing the request payload back to the peer.
    pub fn error(message_id: MessageId, error: impl Into<String>, request_payload: Json) -> Self {
        let payload = ErrorPayload {
            error: error.into(),
            request_payload,
        };
        let payload = serde_json::to_value(payload).unwrap_or_else(|_| json!({}));
        Self::reply(Reply::Error, message_id, payload)
    }

    /// The request verb, if this is a request the gateway understands.
    pub fn request_action(&self) -> Option<Action> {
        Action::parse(&self.action)
    }

    pub fn is_error(&self) -> bool {
        self.action == Reply::Error.as_str()
    }

    /// Decodes the payload into the shape required by `action`.
    pub fn payload_as<T: DeserializeOwned>(&self, action: Action) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|source| Error::MalformedPayload {
            action: action.as_str(),
            source,
        })
    }

    pub fn from_json(message: Json) -> Result<Self> {
        serde_json::from_value(message).map_err(Error::MalformedEnvelope)
    }

    pub fn to_json(&self) -> Json {
        // Envelope fields are plain JSON already; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Json::Null)
    }

    /// Parses JSON text.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::MalformedEnvelope)
    }

    /// Renders JSON text.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Encode)
    }
}
