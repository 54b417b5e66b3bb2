//! In-process bus for tests and single-process embedding.
//!
//! Every endpoint created from the same [`InMemoryBus`] shares one routing
//! table. Delivery follows the bus rules: a message reaches a subscription
//! when the subscriber is the destination, the topic is equal and the
//! sender passes the subscription's source filter.

use std::sync::Arc;

use dashmap::DashMap;
use gatewire::Identity;
use gatewire::IdentityFilter;
use serde_json::Value as Json;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Delivery;
use crate::transport::Subscription;
use crate::transport::Transport;

#[derive(Debug)]
struct Route {
    subscriber: Identity,
    source: IdentityFilter,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// A shared routing table keyed by topic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    routes: Arc<DashMap<String, Vec<Route>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new endpoint speaking as `identity`.
    pub fn endpoint(&self, identity: Identity) -> Endpoint {
        Endpoint {
            bus: self.clone(),
            identity,
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscribers(&self, topic: &str) -> usize {
        self.routes
            .get(topic)
            .map(|routes| routes.iter().filter(|r| !r.tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of topics with at least one route.
    pub fn topics(&self) -> usize {
        self.routes.len()
    }

    /// Drops closed routes, and topics left without any.
    fn sweep(&self) {
        self.routes.retain(|_, routes| {
            routes.retain(|route| !route.tx.is_closed());
            !routes.is_empty()
        });
    }

    fn deliver(&self, sender: &Identity, dest: &Identity, topic: &str, message: Json) -> usize {
        let Some(mut routes) = self.routes.get_mut(topic) else {
            return 0;
        };
        routes.retain(|route| !route.tx.is_closed());
        if routes.is_empty() {
            drop(routes);
            self.routes.remove_if(topic, |_, routes| routes.is_empty());
            return 0;
        }

        let mut delivered = 0;
        for route in routes.iter() {
            if route.subscriber != *dest || !route.source.matches(sender) {
                continue;
            }
            let delivery = Delivery {
                source: sender.clone(),
                topic: topic.to_string(),
                message: message.clone(),
            };
            if route.tx.send(delivery).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// One identity's view of an [`InMemoryBus`].
#[derive(Debug, Clone)]
pub struct Endpoint {
    bus: InMemoryBus,
    identity: Identity,
}

impl Endpoint {
    pub fn bus(&self) -> &InMemoryBus {
        &self.bus
    }
}

#[async_trait::async_trait]
impl Transport for Endpoint {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn send(&self, dest: &Identity, topic: &str, message: Json) -> transport::Result<()> {
        let delivered = self.bus.deliver(&self.identity, dest, topic, message);
        if delivered == 0 {
            tracing::debug!(from = %self.identity, to = %dest, topic, "no subscriber for message");
        }
        Ok(())
    }

    async fn subscribe(&self, source: IdentityFilter, topic: &str) -> transport::Result<Subscription> {
        self.bus.sweep();
        let (tx, rx) = mpsc::unbounded_channel();
        self.bus.routes.entry(topic.to_string()).or_default().push(Route {
            subscriber: self.identity.clone(),
            source,
            tx,
        });
        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (Identity, Identity, Identity) {
        (Identity::app("gateway"), Identity::app("client"), Identity::new("client", "child"))
    }

    #[tokio::test]
    async fn test_directed_delivery() {
        let bus = InMemoryBus::new();
        let (gw, client, _) = ids();
        let gw_end = bus.endpoint(gw.clone());
        let client_end = bus.endpoint(client.clone());

        let mut sub = gw_end.subscribe(IdentityFilter::any(), "gateway-exec").await.unwrap();
        client_end.send(&gw, "gateway-exec", json!({"n": 1})).await.unwrap();

        let d = sub.next().await.unwrap();
        assert_eq!(d.source, client);
        assert_eq!(d.topic, "gateway-exec");
        assert_eq!(d.message, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_source_filter() {
        let bus = InMemoryBus::new();
        let (gw, client, child) = ids();
        let gw_end = bus.endpoint(gw.clone());

        let mut exact = gw_end.subscribe(IdentityFilter::exact(&client), "t").await.unwrap();
        let mut by_app = gw_end.subscribe(IdentityFilter::app("client"), "t").await.unwrap();

        bus.endpoint(child.clone()).send(&gw, "t", json!(1)).await.unwrap();
        bus.endpoint(client.clone()).send(&gw, "t", json!(2)).await.unwrap();

        assert_eq!(exact.next().await.unwrap().message, json!(2));
        assert_eq!(by_app.next().await.unwrap().message, json!(1));
        assert_eq!(by_app.next().await.unwrap().message, json!(2));
    }

    #[tokio::test]
    async fn test_other_destinations_do_not_receive() {
        let bus = InMemoryBus::new();
        let (gw, client, _) = ids();
        let mut client_sub = bus
            .endpoint(client.clone())
            .subscribe(IdentityFilter::any(), "t")
            .await
            .unwrap();

        bus.endpoint(client.clone()).send(&gw, "t", json!("lost")).await.unwrap();
        bus.endpoint(gw.clone()).send(&client, "t", json!("kept")).await.unwrap();
        assert_eq!(client_sub.next().await.unwrap().message, json!("kept"));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = InMemoryBus::new();
        let (gw, client, _) = ids();
        let sub = bus.endpoint(gw.clone()).subscribe(IdentityFilter::any(), "t").await.unwrap();
        assert_eq!(bus.subscribers("t"), 1);
        drop(sub);
        assert_eq!(bus.subscribers("t"), 0);

        // Sending into the void is fine.
        bus.endpoint(client).send(&gw, "t", json!(null)).await.unwrap();
        assert_eq!(bus.topics(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_topics_are_forgotten() {
        let bus = InMemoryBus::new();
        let gw = bus.endpoint(Identity::app("gateway"));
        for n in 0..10 {
            let topic = format!("client-listener-{}", n);
            drop(gw.subscribe(IdentityFilter::any(), &topic).await.unwrap());
        }
        let _live = gw.subscribe(IdentityFilter::any(), "gateway-exec").await.unwrap();
        assert_eq!(bus.topics(), 1);
        assert_eq!(bus.subscribers("gateway-exec"), 1);
    }
}
