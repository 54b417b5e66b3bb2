//! # Proxygate
//!
//! A remote-invocation gateway. Peers on a pub/sub bus send "call this
//! method on that object" envelopes; the gateway runs the call in-process
//! against registered capabilities and a table of retained values, and
//! answers with the serialized result.
//!
//! ## Layout
//!
//! - [`value`], [`serialize`]: the dynamic values calls exchange, and their
//!   cycle-safe JSON rendering.
//! - [`table`]: handles for values a peer asked the gateway to keep.
//! - [`registry`]: what can be called, globally and per host object kind.
//! - [`bridge`]: remote listeners as local callbacks.
//! - [`dispatch`], [`gateway`]: the request state machine and its loop.
//! - [`transport`], [`memory`]: the bus interface and an in-process bus.
//! - [`client`]: the requester side.

pub mod bridge;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod host;
pub mod memory;
pub mod registry;
pub mod serialize;
pub mod table;
pub mod transport;
pub mod value;

pub use client::GatewayClient;
pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use gateway::GatewayHandle;
pub use registry::Registry;
pub use value::HostObject;
pub use value::Value;
