//! # Gatewire
//!
//! The wire vocabulary of the proxy-object gateway: who talks ([`Identity`]),
//! on which topic ([`topic`]), and what they say ([`Envelope`], [`Action`],
//! and the typed payloads in [`payload`]).
//!
//! ## Philosophy
//!
//! - **Text Interchange**: Every message is a JSON document. Payloads stay as
//!   `serde_json::Value` inside the envelope and are decoded into typed
//!   structs only by the side that understands the action.
//! - **Echo, Don't Normalize**: Correlation ids come back exactly as they
//!   were sent, string or integer.

pub mod action;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod payload;
pub mod topic;

pub use action::Action;
pub use action::Reply;
pub use envelope::Envelope;
pub use envelope::MessageId;
pub use error::Error;
pub use error::Result;
pub use identity::Identity;
pub use identity::IdentityFilter;

#[cfg(test)]
mod tests;
