//! # Gateway
//!
//! Wires a transport, a registry and a host together and runs the receive
//! loop on `<uuid>-exec`.
//!
//! ## Philosophy
//!
//! - **One Task Per Request**: The loop only decodes and hands off. Each
//!   envelope is dispatched in its own task, so a slow invocation or a
//!   pending listener round trip never holds up the next request.
//! - **Owned State**: Each gateway owns its dispatcher and proxy table.
//!   Several gateways can share a process (and a bus) without interfering.

use std::sync::Arc;

use gatewire::Envelope;
use gatewire::Identity;
use gatewire::IdentityFilter;
use gatewire::topic::exec_topic;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bridge::ListenerBridge;
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::dispatch::Outcome;
use crate::host::Host;
use crate::host::ProcessExit;
use crate::registry::Registry;
use crate::table::ProxyTable;
use crate::transport;
use crate::transport::Delivery;
use crate::transport::Transport;

/// Fluent builder for a [`Gateway`].
pub struct GatewayBuilder {
    transport: Arc<dyn Transport>,
    registry: Registry,
    host: Arc<dyn Host>,
    config: GatewayConfig,
}

impl GatewayBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            registry: Registry::new(),
            host: Arc::new(ProcessExit),
            config: GatewayConfig::default(),
        }
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Defaults to [`ProcessExit`].
    pub fn host(mut self, host: impl Host) -> Self {
        self.host = Arc::new(host);
        self
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Gateway {
        let bridge = ListenerBridge::new(self.transport.clone(), self.config.listener_timeout());
        let dispatcher = Dispatcher::new(Arc::new(self.registry), bridge, self.config);
        Gateway {
            topic: exec_topic(self.transport.identity()),
            transport: self.transport,
            dispatcher: Arc::new(dispatcher),
            host: self.host,
        }
    }
}

pub struct Gateway {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    host: Arc<dyn Host>,
    topic: String,
}

impl Gateway {
    pub fn builder(transport: Arc<dyn Transport>) -> GatewayBuilder {
        GatewayBuilder::new(transport)
    }

    pub fn identity(&self) -> &Identity {
        self.transport.identity()
    }

    /// The topic requests arrive on and responses leave on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Subscribes to the gateway topic and starts serving.
    ///
    /// The subscription is in place when this returns, so requests sent
    /// afterwards are not lost.
    pub async fn spawn(self) -> transport::Result<GatewayHandle> {
        let mut requests = self
            .transport
            .subscribe(IdentityFilter::any(), &self.topic)
            .await?;

        let (stop, mut stopped) = watch::channel(false);
        let loop_stop = stop.clone();
        let dispatcher = self.dispatcher.clone();
        let gateway = Arc::new(self);

        tracing::info!(
            identity = %gateway.identity(),
            topic = %gateway.topic,
            globals = ?gateway.dispatcher.registry().global_paths(),
            "gateway listening"
        );

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    delivery = requests.next() => {
                        let Some(delivery) = delivery else {
                            tracing::warn!(topic = %gateway.topic, "request subscription closed");
                            break;
                        };
                        let gateway = gateway.clone();
                        let stop = loop_stop.clone();
                        tokio::spawn(async move { gateway.handle(delivery, &stop).await });
                    }
                }
            }
            tracing::info!(topic = %gateway.topic, "gateway stopped");
        });

        Ok(GatewayHandle { stop, task, dispatcher })
    }

    async fn handle(&self, delivery: Delivery, stop: &watch::Sender<bool>) {
        let source = delivery.source;
        let envelope = match Envelope::from_json(delivery.message) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(from = %source, error = %e, "dropping undecodable message");
                return;
            }
        };

        match self.dispatcher.dispatch(&source, envelope).await {
            Outcome::Ignore => {}
            Outcome::Reply(reply) => self.reply(&source, reply).await,
            Outcome::Quit(ack) => {
                self.reply(&source, ack).await;
                self.host.quit();
                stop.send_replace(true);
            }
        }
    }

    async fn reply(&self, dest: &Identity, reply: Envelope) {
        tracing::debug!(
            to = %dest,
            action = %reply.action,
            message_id = %reply.message_id,
            "sending"
        );
        if let Err(e) = self.transport.send(dest, &self.topic, reply.to_json()).await {
            tracing::error!(to = %dest, error = %e, "failed to send response");
        }
    }
}

/// Control over a running gateway. Dropping the handle leaves the gateway
/// running.
pub struct GatewayHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    dispatcher: Arc<Dispatcher>,
}

impl GatewayHandle {
    /// Stops the receive loop. Requests already being dispatched finish.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn table(&self) -> &ProxyTable {
        self.dispatcher.table()
    }

    /// Waits for the receive loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "gateway loop failed");
        }
    }
}
