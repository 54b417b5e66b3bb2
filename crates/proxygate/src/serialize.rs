//! # Result Serializer
//!
//! Turns an arbitrary [`Value`] graph into plain JSON for the wire.
//!
//! ## Invariants
//!
//! - Terminates on any graph: a composite already on the current path is
//!   written as [`CIRCULAR`] instead of being walked again.
//! - Tracking is per path, not per call: a node reachable through two
//!   sibling branches is written out in full on both.
//! - Only JSON primitives come out. `Undefined` and functions are dropped
//!   from objects and become `null` in arrays; non-finite floats become
//!   `null`; host objects are written through their snapshot.

use std::collections::HashSet;

use serde_json::Map;
use serde_json::Number;
use serde_json::Value as Json;

use crate::value::Value;

/// Marker written in place of a back-reference to an ancestor.
pub const CIRCULAR: &str = "[Circular]";

/// Serializes `value`. Returns `None` when the value has no JSON form at top
/// level (`Undefined` or a function).
pub fn serialize(value: &Value) -> Option<Json> {
    let mut path = HashSet::new();
    walk(value, &mut path)
}

/// Serializes a value that must produce JSON, using `null` where
/// [`serialize`] would return `None`.
pub fn serialize_or_null(value: &Value) -> Json {
    serialize(value).unwrap_or(Json::Null)
}

fn walk(value: &Value, path: &mut HashSet<usize>) -> Option<Json> {
    match value {
        Value::Undefined | Value::Function(_) => None,
        Value::Null => Some(Json::Null),
        Value::Bool(b) => Some(Json::Bool(*b)),
        Value::Int(n) => Some(Json::from(*n)),
        Value::Float(f) => Some(Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null)),
        Value::String(s) => Some(Json::String(s.clone())),
        Value::Array(array) => Some(enter(array.addr(), path, |path| {
            let items = array
                .items()
                .iter()
                .map(|item| walk(item, path).unwrap_or(Json::Null))
                .collect();
            Json::Array(items)
        })),
        Value::Object(object) => Some(enter(object.addr(), path, |path| {
            let mut map = Map::new();
            for (key, item) in object.entries() {
                if let Some(json) = walk(&item, path) {
                    map.insert(key, json);
                }
            }
            Json::Object(map)
        })),
        Value::Host(host) => Some(enter(host.addr(), path, |path| {
            walk(&host.snapshot(), path).unwrap_or(Json::Null)
        })),
    }
}

/// Walks into a composite node, or returns the marker if it is an ancestor.
fn enter(
    addr: usize,
    path: &mut HashSet<usize>,
    body: impl FnOnce(&mut HashSet<usize>) -> Json,
) -> Json {
    if !path.insert(addr) {
        return Json::String(CIRCULAR.to_string());
    }
    let json = body(path);
    path.remove(&addr);
    json
}
