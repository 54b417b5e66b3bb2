//! # Payloads
//!
//! Typed views of the `payload` field, one per action. Field names follow the
//! wire (`proxyObjId`, `listenerArgIdx`, ...). Optional fields are omitted
//! when absent rather than sent as `null`.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value as Json;

/// `invoke` request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_obj_id: Option<String>,
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<Json>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proxy_result: bool,
}

/// `add-listener` request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddListenerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_obj_id: Option<String>,
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<Json>,
    /// Position at which the gateway splices the listener into `args`.
    /// Negative positions count from the end.
    #[serde(default, deserialize_with = "null_as_default")]
    pub listener_arg_idx: i64,
    /// Topic the gateway uses to forward listener invocations.
    pub iab_topic: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proxy_result: bool,
}

/// `remove-listener` request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveListenerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_obj_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_listener_id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub event: Json,
}

/// `invoke-result` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_obj_id: Option<String>,
}

/// `add-listener-result` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddListenerResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_obj_id: Option<String>,
}

/// `error` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default)]
    pub request_payload: Json,
}

impl AddListenerRequest {
    /// Where the listener lands in an argument list of `len` items.
    /// Out-of-range positions are clamped; negative ones count from the end.
    pub fn splice_index(&self, len: usize) -> usize {
        let idx = self.listener_arg_idx;
        if idx < 0 {
            len.saturating_sub(idx.unsigned_abs() as usize)
        } else {
            (idx as u64).min(len as u64) as usize
        }
    }
}

/// An explicit `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
