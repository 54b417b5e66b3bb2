//! # Gateway Client
//!
//! The requester side of the protocol. Sends envelopes to a gateway's exec
//! topic and correlates responses through a background pump.
//!
//! Message ids are numeric and come from a per-client counter. Listener
//! topics are `<uuid>-listener-<n>` under this client's own identity; the
//! client answers each forwarded event with the listener's return value.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use gatewire::Action;
use gatewire::Envelope;
use gatewire::Identity;
use gatewire::IdentityFilter;
use gatewire::MessageId;
use gatewire::Reply;
use gatewire::payload::AddListenerRequest;
use gatewire::payload::AddListenerResult;
use gatewire::payload::ErrorPayload;
use gatewire::payload::InvokeRequest;
use gatewire::payload::InvokeResult;
use gatewire::payload::RemoveListenerRequest;
use gatewire::topic::exec_topic;
use gatewire::topic::listener_topic;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::transport;
use crate::transport::Subscription;
use crate::transport::Transport;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] transport::Error),
    /// The gateway answered with an `error` envelope.
    #[error("{message}")]
    Remote { message: String, request_payload: Json },
    #[error("request timed out")]
    Timeout,
    #[error("response channel closed")]
    Closed,
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long to wait for a response before giving up on a request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A value retained in the gateway's proxy table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyObject {
    id: String,
}

impl ProxyObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A listener retained in the gateway's proxy table, plus the topic this
/// client serves it on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyListener {
    id: String,
    topic: String,
}

impl ProxyListener {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Result of an `invoke`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutcome {
    /// Serialized return value. `None` when the method returned nothing.
    pub result: Option<Json>,
    /// Present when the call asked for the result to be retained.
    pub proxy: Option<ProxyObject>,
}

/// Local side of a remote listener. Receives the event arguments, returns
/// the reply sent back to the gateway.
pub type ListenerFn = Arc<dyn Fn(Vec<Json>) -> Json + Send + Sync>;

struct PendingResponse {
    expected: Reply,
    tx: oneshot::Sender<Result<Json>>,
}

/// Removes a request's pending entry when the request goes away.
struct PendingGuard<'a> {
    pending: &'a DashMap<u64, PendingResponse>,
    seq: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.seq);
    }
}

pub struct GatewayClient {
    transport: Arc<dyn Transport>,
    gateway: Identity,
    topic: String,
    config: ClientConfig,
    pending: Arc<DashMap<u64, PendingResponse>>,
    seq_gen: AtomicU64,
    listener_seq: AtomicU64,
    listeners: DashMap<String, JoinHandle<()>>,
    pump: JoinHandle<()>,
}

impl GatewayClient {
    /// Subscribes to responses from `gateway` and starts the pump.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        gateway: Identity,
        config: ClientConfig,
    ) -> Result<Self> {
        let topic = exec_topic(&gateway);
        let mut responses = transport
            .subscribe(IdentityFilter::exact(&gateway), &topic)
            .await?;

        let pending: Arc<DashMap<u64, PendingResponse>> = Arc::new(DashMap::new());
        let pump_pending = pending.clone();
        let pump = tokio::spawn(async move {
            while let Some(delivery) = responses.next().await {
                Self::handle_response(delivery.message, &pump_pending);
            }
            let error = transport::Error::ConnectionLost("response subscription closed".into());
            Self::notify_all_pending(&pump_pending, Error::Transport(error));
        });

        tracing::debug!(client = %transport.identity(), gateway = %gateway, "connected");
        Ok(Self {
            transport,
            gateway,
            topic,
            config,
            pending,
            seq_gen: AtomicU64::new(0),
            listener_seq: AtomicU64::new(0),
            listeners: DashMap::new(),
            pump,
        })
    }

    pub fn gateway(&self) -> &Identity {
        &self.gateway
    }

    pub async fn ping(&self) -> Result<()> {
        self.request(Action::Ping, json!({})).await.map(drop)
    }

    /// Calls `method` globally, or on `target` when given.
    pub async fn invoke(
        &self,
        target: Option<&ProxyObject>,
        method: &str,
        args: Vec<Json>,
        retain: bool,
    ) -> Result<InvokeOutcome> {
        let request = InvokeRequest {
            proxy_obj_id: target.map(|t| t.id.clone()),
            method: method.to_string(),
            args,
            proxy_result: retain,
        };
        let response: InvokeResult = decode(self.request(Action::Invoke, encode(request)?).await?)?;
        Ok(InvokeOutcome {
            result: response.result,
            proxy: response.proxy_obj_id.map(ProxyObject::new),
        })
    }

    /// Releases a retained value or listener.
    pub async fn delete(&self, handle: &str) -> Result<()> {
        self.request(Action::Delete, json!(handle)).await.map(drop)
    }

    /// Registers `listener` as an argument of `method`, spliced in at
    /// `listener_arg_idx` (negative counts from the end).
    ///
    /// The listener is served until [`remove_listener`](Self::remove_listener)
    /// or until the client is dropped. A [`ProxyListener`] comes back only
    /// when `retain` is set.
    pub async fn add_listener(
        &self,
        target: Option<&ProxyObject>,
        method: &str,
        args: Vec<Json>,
        listener_arg_idx: i64,
        retain: bool,
        listener: ListenerFn,
    ) -> Result<Option<ProxyListener>> {
        let n = self.listener_seq.fetch_add(1, Ordering::Relaxed);
        let topic = listener_topic(self.transport.identity(), n);
        let events = self
            .transport
            .subscribe(IdentityFilter::exact(&self.gateway), &topic)
            .await?;
        let server = tokio::spawn(serve_listener(
            self.transport.clone(),
            topic.clone(),
            events,
            listener,
        ));
        self.listeners.insert(topic.clone(), server);

        let request = AddListenerRequest {
            proxy_obj_id: target.map(|t| t.id.clone()),
            method: method.to_string(),
            args,
            listener_arg_idx,
            iab_topic: topic.clone(),
            proxy_result: retain,
        };
        let response = match self.request(Action::AddListener, encode(request)?).await {
            Ok(response) => response,
            Err(e) => {
                self.stop_serving(&topic);
                return Err(e);
            }
        };
        let response: AddListenerResult = decode(response)?;
        Ok(response
            .proxy_obj_id
            .map(|id| ProxyListener { id, topic }))
    }

    /// Stops serving `listener`, asks the gateway to call the removal
    /// `method` with `(event, listener)`, then releases the listener handle.
    pub async fn remove_listener(
        &self,
        target: Option<&ProxyObject>,
        method: &str,
        event: Json,
        listener: &ProxyListener,
    ) -> Result<()> {
        self.stop_serving(&listener.topic);
        let request = RemoveListenerRequest {
            proxy_obj_id: target.map(|t| t.id.clone()),
            proxy_listener_id: Some(listener.id.clone()),
            method: method.to_string(),
            event,
        };
        self.request(Action::RemoveListener, encode(request)?).await?;
        self.delete(&listener.id).await
    }

    /// Asks the gateway to quit. Resolves once the gateway acknowledged.
    pub async fn quit(&self) -> Result<()> {
        self.request(Action::Quit, json!({})).await.map(drop)
    }

    /// Sends one request and waits for its correlated response payload.
    ///
    /// The pending entry is released however this future ends, including
    /// when the caller drops it mid-flight.
    pub async fn request(&self, action: Action, payload: Json) -> Result<Json> {
        let seq = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, PendingResponse {
            expected: action.reply(),
            tx,
        });
        let _guard = PendingGuard {
            pending: &self.pending,
            seq,
        };

        let envelope = Envelope::request(action, seq, payload);
        self.transport
            .send(&self.gateway, &self.topic, envelope.to_json())
            .await?;

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn stop_serving(&self, topic: &str) {
        if let Some((_, server)) = self.listeners.remove(topic) {
            server.abort();
        }
    }

    fn handle_response(message: Json, pending: &DashMap<u64, PendingResponse>) {
        let envelope = match Envelope::from_json(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable response");
                return;
            }
        };
        let MessageId::Number(seq) = envelope.message_id else {
            tracing::debug!(message_id = %envelope.message_id, "ignoring response to another requester");
            return;
        };
        let Some((_, pending_resp)) = pending.remove(&seq) else {
            return;
        };

        let result = if envelope.is_error() {
            match serde_json::from_value::<ErrorPayload>(envelope.payload) {
                Ok(payload) => Err(Error::Remote {
                    message: payload.error,
                    request_payload: payload.request_payload,
                }),
                Err(e) => Err(Error::Malformed(e.to_string())),
            }
        } else if envelope.action != pending_resp.expected.as_str() {
            Err(Error::Malformed(format!(
                "expected {}, got {}",
                pending_resp.expected, envelope.action
            )))
        } else {
            Ok(envelope.payload)
        };

        let _ = pending_resp.tx.send(result);
    }

    fn notify_all_pending(pending: &DashMap<u64, PendingResponse>, error: Error) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, pending_resp)) = pending.remove(&key) {
                let _ = pending_resp.tx.send(Err(error.clone()));
            }
        }
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.pump.abort();
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
    }
}

async fn serve_listener(
    transport: Arc<dyn Transport>,
    topic: String,
    mut events: Subscription,
    listener: ListenerFn,
) {
    while let Some(delivery) = events.next().await {
        let args = match delivery.message {
            Json::Array(args) => args,
            other => vec![other],
        };
        let reply = listener(args);
        if let Err(e) = transport.send(&delivery.source, &topic, reply).await {
            tracing::error!(topic = %topic, error = %e, "failed to answer listener event");
        }
    }
}

fn encode<T: Serialize>(payload: T) -> Result<Json> {
    serde_json::to_value(payload).map_err(|e| Error::Malformed(e.to_string()))
}

fn decode<T: DeserializeOwned>(payload: Json) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::Malformed(e.to_string()))
}
