//! # Dispatcher
//!
//! The per-request state machine. One inbound envelope goes in, at most one
//! terminal envelope comes out, carrying the request's `messageId`.
//!
//! ## Invariants
//!
//! - Every known action produces exactly one reply: its result action on
//!   success, `error` otherwise. Failures never escape this module.
//! - Handles named by a request are checked before anything is invoked.
//! - Error text is `"<action> error, <reason>"`, and the error payload
//!   echoes the request payload.

use std::sync::Arc;

use gatewire::Action;
use gatewire::Envelope;
use gatewire::Identity;
use gatewire::payload::AddListenerRequest;
use gatewire::payload::AddListenerResult;
use gatewire::payload::InvokeRequest;
use gatewire::payload::InvokeResult;
use gatewire::payload::RemoveListenerRequest;
use serde::Serialize;
use serde_json::Value as Json;
use serde_json::json;
use tracing::Instrument;

use crate::bridge::ListenerBridge;
use crate::config::GatewayConfig;
use crate::config::UnknownActionPolicy;
use crate::registry;
use crate::registry::Registry;
use crate::serialize::serialize;
use crate::table::ProxyHandle;
use crate::table::ProxyTable;
use crate::value::Value;

/// Why a request failed. Rendered after the `"<action> error, "` prefix.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("proxyObject removed already")]
    StaleObject,
    #[error("proxyListener removed already")]
    StaleListener,
    #[error(transparent)]
    Call(#[from] registry::Error),
    #[error(transparent)]
    Wire(#[from] gatewire::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// What the gateway loop should do after dispatching one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send this envelope back to the requester.
    Reply(Envelope),
    /// Send the acknowledgement, then shut down.
    Quit(Envelope),
    /// Nothing to send.
    Ignore,
}

impl Outcome {
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Reply(envelope) | Self::Quit(envelope) => Some(envelope),
            Self::Ignore => None,
        }
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    table: ProxyTable,
    registry: Arc<Registry>,
    bridge: ListenerBridge,
    config: GatewayConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, bridge: ListenerBridge, config: GatewayConfig) -> Self {
        Self {
            table: ProxyTable::new(),
            registry,
            bridge,
            config,
        }
    }

    pub fn table(&self) -> &ProxyTable {
        &self.table
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handles one envelope received from `source`.
    pub async fn dispatch(&self, source: &Identity, envelope: Envelope) -> Outcome {
        let span = tracing::debug_span!(
            "dispatch",
            action = %envelope.action,
            message_id = %envelope.message_id,
            from = %source,
        );
        self.dispatch_inner(source, envelope).instrument(span).await
    }

    async fn dispatch_inner(&self, source: &Identity, envelope: Envelope) -> Outcome {
        if self.config.log_payloads {
            tracing::debug!(payload = %envelope.payload, "received");
        } else {
            tracing::debug!("received");
        }

        let Some(action) = envelope.request_action() else {
            return self.unknown(envelope);
        };

        let result = match action {
            Action::Ping | Action::Quit => Ok(json!({})),
            Action::Delete => self.delete(&envelope.payload),
            Action::Invoke => self.invoke(&envelope).await,
            Action::AddListener => self.add_listener(source, &envelope).await,
            Action::RemoveListener => self.remove_listener(&envelope).await,
        };

        match result {
            Ok(payload) => {
                let reply = Envelope::reply(action.reply(), envelope.message_id, payload);
                if action == Action::Quit {
                    Outcome::Quit(reply)
                } else {
                    Outcome::Reply(reply)
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "{} failed", action);
                Outcome::Reply(Envelope::error(
                    envelope.message_id,
                    format!("{} error, {}", action, e),
                    envelope.payload,
                ))
            }
        }
    }

    fn unknown(&self, envelope: Envelope) -> Outcome {
        match self.config.unknown_actions {
            UnknownActionPolicy::Ignore => {
                tracing::warn!("ignoring unknown action");
                Outcome::Ignore
            }
            UnknownActionPolicy::Reject => {
                tracing::warn!("rejecting unknown action");
                Outcome::Reply(Envelope::error(
                    envelope.message_id,
                    format!("unknown action: {}", envelope.action),
                    envelope.payload,
                ))
            }
        }
    }

    fn delete(&self, payload: &Json) -> Result<Json> {
        let handle = payload.as_str().and_then(|h| h.parse::<ProxyHandle>().ok());
        match handle.and_then(|h| self.table.remove(h)) {
            Some(_) => Ok(json!({})),
            None => Err(Error::StaleObject),
        }
    }

    async fn invoke(&self, envelope: &Envelope) -> Result<Json> {
        let request: InvokeRequest = envelope.payload_as(Action::Invoke)?;
        let target = self.target(request.proxy_obj_id.as_deref())?;
        let args = request.args.iter().map(Value::from_json).collect();

        let value = self
            .registry
            .invoke(target.as_ref(), &request.method, args)
            .await?;

        let mut result = InvokeResult {
            result: serialize(&value),
            proxy_obj_id: None,
        };
        if self.config.log_payloads {
            tracing::debug!(method = %request.method, result = ?result.result, "invoked");
        }
        if request.proxy_result && !value.is_undefined() {
            result.proxy_obj_id = Some(self.table.put(value).to_string());
        }
        to_payload(result)
    }

    async fn add_listener(&self, source: &Identity, envelope: &Envelope) -> Result<Json> {
        let request: AddListenerRequest = envelope.payload_as(Action::AddListener)?;
        let target = self.target(request.proxy_obj_id.as_deref())?;

        let listener = self
            .bridge
            .create_listener(source.clone(), request.iab_topic.clone());
        let mut args: Vec<Value> = request.args.iter().map(Value::from_json).collect();
        let idx = request.splice_index(args.len());
        args.insert(idx, Value::Function(listener.clone()));

        self.registry
            .invoke(target.as_ref(), &request.method, args)
            .await?;

        let proxy_obj_id = request
            .proxy_result
            .then(|| self.table.put(Value::Function(listener)).to_string());
        to_payload(AddListenerResult { proxy_obj_id })
    }

    async fn remove_listener(&self, envelope: &Envelope) -> Result<Json> {
        let request: RemoveListenerRequest = envelope.payload_as(Action::RemoveListener)?;
        let target = self.target(request.proxy_obj_id.as_deref())?;
        let listener = match present(request.proxy_listener_id.as_deref()) {
            None => Value::Undefined,
            Some(handle) => self
                .table
                .lookup(Some(handle))
                .ok_or(Error::StaleListener)?,
        };

        let args = vec![Value::from_json(&request.event), listener];
        self.registry
            .invoke(target.as_ref(), &request.method, args)
            .await?;
        Ok(envelope.payload.clone())
    }

    /// `Ok(None)` selects global mode. A named handle must be live.
    fn target(&self, handle: Option<&str>) -> Result<Option<Value>> {
        match present(handle) {
            None => Ok(None),
            Some(handle) => self
                .table
                .lookup(Some(handle))
                .map(Some)
                .ok_or(Error::StaleObject),
        }
    }
}

/// An empty handle counts as no handle.
fn present(handle: Option<&str>) -> Option<&str> {
    handle.filter(|h| !h.is_empty())
}

fn to_payload<T: Serialize>(payload: T) -> Result<Json> {
    serde_json::to_value(payload).map_err(|e| Error::Wire(gatewire::Error::Encode(e)))
}
