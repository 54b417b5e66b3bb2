//! # Bus Transport
//!
//! A minimal, async interface onto a topic-addressed message bus.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: The transport moves JSON messages between
//!   identities on named topics. It knows nothing about envelopes, actions
//!   or proxies.
//! - **Directed Send, Filtered Subscribe**: A send names one destination
//!   identity. A subscription names a topic and which senders it accepts.
//! - **Scoped Subscriptions**: A [`Subscription`] lives as long as its value.
//!   Dropping it unsubscribes.

use gatewire::Identity;
use gatewire::IdentityFilter;
use serde_json::Value as Json;
use tokio::sync::mpsc;

/// Errors that occur at the bus layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The bus is unreachable or the connection was dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The bus refused the subscription.
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
    /// Generic I/O error or internal bus failure.
    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One message received on a subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub source: Identity,
    pub topic: String,
    pub message: Json,
}

/// A live subscription. Messages arrive in bus order.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { rx }
    }

    /// Waits for the next delivery. `None` once the bus side is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// A handle onto the bus for one identity.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The identity this endpoint sends as.
    fn identity(&self) -> &Identity;

    /// Sends `message` on `topic` to `dest`.
    ///
    /// Sending to a topic nobody listens on is not an error.
    async fn send(&self, dest: &Identity, topic: &str, message: Json) -> Result<()>;

    /// Subscribes to `topic` for messages from senders matching `source`.
    async fn subscribe(&self, source: IdentityFilter, topic: &str) -> Result<Subscription>;
}
