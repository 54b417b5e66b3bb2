//! # Proxy Table
//!
//! Registry of values the gateway keeps alive on behalf of peers. A peer
//! only ever sees the [`ProxyHandle`]; the value stays here until a `delete`
//! removes it.
//!
//! Uses DashMap and an atomic sequence so concurrently dispatched requests
//! can allocate and look up handles without a global lock.

use std::str::FromStr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::value::Value;

/// Prefix of every handle string.
pub const HANDLE_PREFIX: &str = "proxy-";

/// Strong type for proxy handles. On the wire it is `proxy-<n>`.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProxyHandle(pub u64);

impl std::fmt::Display for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", HANDLE_PREFIX, self.0)
    }
}

/// The handle string did not have the `proxy-<n>` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a proxy handle: {0:?}")]
pub struct InvalidHandle(pub String);

impl FromStr for ProxyHandle {
    type Err = InvalidHandle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(HANDLE_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .map(ProxyHandle)
            .ok_or_else(|| InvalidHandle(s.to_string()))
    }
}

/// Handle → value table owned by one gateway.
///
/// Handles come from a counter that only moves forward, so a removed handle
/// is never handed out again by the same table.
#[derive(Debug, Default)]
pub struct ProxyTable {
    entries: DashMap<ProxyHandle, Value>,
    next_handle: AtomicU64,
}

impl ProxyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under a fresh handle.
    pub fn put(&self, value: Value) -> ProxyHandle {
        let handle = ProxyHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(handle, value);
        handle
    }

    pub fn get(&self, handle: ProxyHandle) -> Option<Value> {
        self.entries.get(&handle).map(|entry| entry.value().clone())
    }

    /// Looks up a handle as received from a peer. Empty, malformed, unknown
    /// and removed handles all come back as `None`.
    pub fn lookup(&self, handle: Option<&str>) -> Option<Value> {
        let handle = handle.filter(|h| !h.is_empty())?;
        self.get(handle.parse().ok()?)
    }

    /// Removes an entry, returning the value if it was present.
    pub fn remove(&self, handle: ProxyHandle) -> Option<Value> {
        self.entries.remove(&handle).map(|(_, value)| value)
    }

    pub fn contains(&self, handle: ProxyHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Handles already issued stay retired.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_handles_are_distinct() {
        let table = ProxyTable::new();
        let handles: HashSet<_> = (0..100).map(|n| table.put(Value::Int(n))).collect();
        assert_eq!(handles.len(), 100);
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn test_handle_format() {
        let table = ProxyTable::new();
        assert_eq!(table.put(Value::Null).to_string(), "proxy-0");
        assert_eq!(table.put(Value::Null).to_string(), "proxy-1");
        assert_eq!("proxy-12".parse::<ProxyHandle>(), Ok(ProxyHandle(12)));
        assert!("window-12".parse::<ProxyHandle>().is_err());
        assert!("proxy-".parse::<ProxyHandle>().is_err());
    }

    #[test]
    fn test_removed_handle_is_absent_and_not_reused() {
        let table = ProxyTable::new();
        let first = table.put(Value::from("a"));
        assert!(table.remove(first).is_some());

        assert!(table.get(first).is_none());
        assert!(table.lookup(Some(&first.to_string())).is_none());
        assert!(table.remove(first).is_none());

        let second = table.put(Value::from("b"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_lookup_of_missing_or_empty_handles() {
        let table = ProxyTable::new();
        table.put(Value::Int(1));

        assert!(table.lookup(None).is_none());
        assert!(table.lookup(Some("")).is_none());
        assert!(table.lookup(Some("garbage")).is_none());
        assert!(table.lookup(Some("proxy-77")).is_none());
        assert_eq!(table.lookup(Some("proxy-0")).and_then(|v| v.as_i64()), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_never_collides() {
        let table = Arc::new(ProxyTable::new());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            tasks.push(tokio::spawn(async move {
                (0..250).map(|_| table.put(Value::Null)).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            for handle in task.await.unwrap() {
                assert!(seen.insert(handle), "duplicate handle {}", handle);
            }
        }
        assert_eq!(seen.len(), 2000);
        assert_eq!(table.len(), 2000);
    }
}
