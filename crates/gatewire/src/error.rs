//! # Error Definitions
//!
//! Failures while moving envelopes in and out of their JSON form.

/// Wire-level failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The text was not valid JSON, or did not have the shape of an envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
    /// The payload did not match the shape required by its action.
    #[error("malformed {action} payload: {source}")]
    MalformedPayload {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// The envelope could not be rendered as JSON text.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
