//! # Listener Bridge
//!
//! Turns a remote listener registration into a local [`Function`]. Calling
//! the function forwards its arguments to the requester over the bus and
//! resolves with whatever the requester sends back.
//!
//! ## Invariants
//!
//! - The reply subscription is opened before the arguments are sent, so a
//!   fast reply cannot be missed.
//! - Only replies from the requester, on the listener topic, are accepted.
//! - The subscription lives for exactly one round trip.

use std::sync::Arc;
use std::time::Duration;

use gatewire::Identity;
use gatewire::IdentityFilter;

use crate::serialize::serialize_or_null;
use crate::transport;
use crate::transport::Transport;
use crate::value::Function;
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] transport::Error),
    #[error("listener on {topic} got no reply within {after:?}")]
    Timeout { topic: String, after: Duration },
    #[error("listener on {0} lost its reply subscription")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct ListenerBridge {
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl ListenerBridge {
    pub fn new(transport: Arc<dyn Transport>, timeout: Option<Duration>) -> Self {
        Self { transport, timeout }
    }

    /// Builds the local callback for a listener registered by `requester`
    /// on `topic`.
    pub fn create_listener(&self, requester: Identity, topic: String) -> Function {
        let bridge = self.clone();
        Function::new(move |args: Vec<Value>| {
            let bridge = bridge.clone();
            let requester = requester.clone();
            let topic = topic.clone();
            async move {
                bridge
                    .round_trip(&requester, &topic, args)
                    .await
                    .map_err(anyhow::Error::from)
            }
        })
    }

    /// Sends `args` to `requester` on `topic` and waits for one reply.
    pub async fn round_trip(&self, requester: &Identity, topic: &str, args: Vec<Value>) -> Result<Value> {
        let mut replies = self
            .transport
            .subscribe(IdentityFilter::exact(requester), topic)
            .await?;

        let event = serialize_or_null(&Value::array(args));
        tracing::debug!(to = %requester, topic, "forwarding listener event");
        self.transport.send(requester, topic, event).await?;

        let reply = match self.timeout {
            None => replies.next().await,
            Some(after) => tokio::time::timeout(after, replies.next())
                .await
                .map_err(|_| Error::Timeout {
                    topic: topic.to_string(),
                    after,
                })?,
        };
        let delivery = reply.ok_or_else(|| Error::Closed(topic.to_string()))?;
        tracing::debug!(from = %delivery.source, topic, "listener reply received");
        Ok(Value::from_json(&delivery.message))
    }
}

impl std::fmt::Debug for ListenerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBridge")
            .field("identity", self.transport.identity())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBus;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_resolves_with_reply() {
        let bus = InMemoryBus::new();
        let gateway = Identity::app("gateway");
        let client = Identity::app("client");
        let client_end = bus.endpoint(client.clone());
        let mut events = client_end
            .subscribe(IdentityFilter::exact(&gateway), "client-listener-0")
            .await
            .unwrap();

        let bridge = ListenerBridge::new(Arc::new(bus.endpoint(gateway.clone())), None);
        let listener = bridge.create_listener(client.clone(), "client-listener-0".into());

        let responder = tokio::spawn(async move {
            let event = events.next().await.unwrap();
            assert_eq!(event.message, json!(["a", 2]));
            client_end
                .send(&event.source, "client-listener-0", json!({"ack": true}))
                .await
                .unwrap();
        });

        let reply = listener
            .call(vec![Value::from("a"), Value::Int(2)])
            .await
            .unwrap();
        responder.await.unwrap();
        assert_eq!(reply.property("ack").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(bus.subscribers("client-listener-0"), 0);
    }

    #[tokio::test]
    async fn test_replies_from_strangers_are_ignored() {
        let bus = InMemoryBus::new();
        let gateway = Identity::app("gateway");
        let client = Identity::app("client");
        let stranger = bus.endpoint(Identity::app("stranger"));
        let client_end = bus.endpoint(client.clone());
        let mut events = client_end
            .subscribe(IdentityFilter::any(), "t")
            .await
            .unwrap();

        let bridge = ListenerBridge::new(Arc::new(bus.endpoint(gateway.clone())), None);
        let call = tokio::spawn({
            let bridge = bridge.clone();
            let client = client.clone();
            async move { bridge.round_trip(&client, "t", vec![]).await }
        });

        let event = events.next().await.unwrap();
        assert_eq!(event.message, json!([]));
        stranger.send(&gateway, "t", json!("nope")).await.unwrap();
        client_end.send(&gateway, "t", json!("yes")).await.unwrap();

        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.as_str(), Some("yes"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let bus = InMemoryBus::new();
        let bridge = ListenerBridge::new(
            Arc::new(bus.endpoint(Identity::app("gateway"))),
            Some(Duration::from_millis(20)),
        );
        let err = bridge
            .round_trip(&Identity::app("gone"), "gone-listener-0", vec![Value::Null])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(bus.subscribers("gone-listener-0"), 0);
    }
}
