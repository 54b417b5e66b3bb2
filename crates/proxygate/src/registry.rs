//! # Capability Registry
//!
//! The method resolver. Peers name what they want to call with a dotted
//! path; the registry is the complete list of what may be called.
//!
//! ## Philosophy
//!
//! - **Closed Surface**: Global functions are registered by full path
//!   (`namespace.name`), instance operations per host object kind. Nothing
//!   outside the registry is reachable, whatever the path says.
//! - **Kind Tables**: An instance call goes handle → value → kind → operation.
//!   Kinds are keyed by the concrete Rust type behind the [`HostRef`].
//! - **Uniform Futures**: Every handler returns a boxed future, so sync and
//!   async handlers are awaited the same way by the dispatcher.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future;

use crate::value::CallFuture;
use crate::value::Function;
use crate::value::HostObject;
use crate::value::HostRef;
use crate::value::Value;

/// Resolution and invocation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Global mode: the path is not registered.
    #[error("invalid method: {0}")]
    InvalidMethod(String),
    /// Instance mode: the path does not lead to a callable on the target.
    #[error("invalid instance method: {0}")]
    InvalidInstanceMethod(String),
    /// The handler returned an error or panicked.
    #[error("{0}")]
    Invocation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Handler for a global function.
pub type GlobalHandler = Arc<dyn Fn(Vec<Value>) -> CallFuture + Send + Sync>;

/// Handler for an operation on a host object kind.
pub type MethodHandler = Arc<dyn Fn(HostRef, Vec<Value>) -> CallFuture + Send + Sync>;

#[derive(Clone)]
struct KindTable {
    kind: &'static str,
    ops: HashMap<String, MethodHandler>,
}

/// Every callable the gateway exposes.
#[derive(Clone, Default)]
pub struct Registry {
    namespaces: HashMap<String, HashMap<String, GlobalHandler>>,
    kinds: HashMap<TypeId, KindTable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a global function under its full dotted path.
    pub fn global<F, Fut>(mut self, path: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let (namespace, name) = split_path(path);
        let handler: GlobalHandler = Arc::new(move |args| f(args).boxed());
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), handler);
        self
    }

    /// Registers operation `name` for host objects of kind `T`.
    pub fn method<T, F, Fut>(mut self, name: &str, f: F) -> Self
    where
        T: HostObject,
        F: Fn(Arc<T>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |receiver: HostRef, args| {
            match receiver.downcast::<T>() {
                Some(object) => f(object, args).boxed(),
                None => future::ready(Err(anyhow::anyhow!(
                    "receiver is a {}, not a {}",
                    receiver.kind(),
                    std::any::type_name::<T>()
                )))
                .boxed(),
            }
        });
        self.kinds
            .entry(TypeId::of::<T>())
            .or_insert_with(|| KindTable {
                kind: std::any::type_name::<T>(),
                ops: HashMap::new(),
            })
            .ops
            .insert(name.to_string(), handler);
        self
    }

    /// All registered global paths, sorted.
    pub fn global_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .namespaces
            .iter()
            .flat_map(|(namespace, ops)| ops.keys().map(move |name| join_path(namespace, name)))
            .collect();
        paths.sort();
        paths
    }

    /// Number of host object kinds with at least one operation.
    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }

    /// Resolves `path` against `target`, or against the global namespace
    /// when there is no target.
    pub fn resolve(&self, target: Option<&Value>, path: &str) -> Result<Callable> {
        match target {
            None => self.resolve_global(path),
            Some(target) => self.resolve_instance(target, path),
        }
    }

    /// Resolves and calls. Handler errors and panics come back as
    /// [`Error::Invocation`] carrying the underlying message.
    pub async fn invoke(&self, target: Option<&Value>, path: &str, args: Vec<Value>) -> Result<Value> {
        let callable = self.resolve(target, path)?;
        let call = async move { callable.call(args).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::Invocation(e.to_string())),
            Err(panic) => Err(Error::Invocation(panic_message(panic.as_ref()))),
        }
    }

    fn resolve_global(&self, path: &str) -> Result<Callable> {
        let (namespace, name) = split_path(path);
        self.namespaces
            .get(namespace)
            .and_then(|ops| ops.get(name))
            .filter(|_| !name.is_empty())
            .cloned()
            .map(Callable::Global)
            .ok_or_else(|| Error::InvalidMethod(path.to_string()))
    }

    fn resolve_instance(&self, target: &Value, path: &str) -> Result<Callable> {
        let invalid = || Error::InvalidInstanceMethod(path.to_string());
        let (prefix, name) = split_path(path);
        if name.is_empty() {
            return Err(invalid());
        }

        let mut receiver = target.clone();
        if !prefix.is_empty() {
            for segment in prefix.split('.') {
                if segment.is_empty() {
                    return Err(invalid());
                }
                receiver = receiver.property(segment).ok_or_else(invalid)?;
            }
        }

        if let Value::Host(host) = &receiver {
            let op = self
                .kinds
                .get(&host.type_id())
                .and_then(|table| table.ops.get(name));
            if let Some(handler) = op {
                return Ok(Callable::Method {
                    handler: handler.clone(),
                    receiver: host.clone(),
                });
            }
        }

        match receiver.property(name) {
            Some(Value::Function(f)) => Ok(Callable::Function(f)),
            _ => Err(invalid()),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.kinds.values().map(|table| table.kind).collect();
        f.debug_struct("Registry")
            .field("globals", &self.global_paths())
            .field("kinds", &kinds)
            .finish()
    }
}

/// A resolved call target, ready to be invoked with positional arguments.
#[derive(Clone)]
pub enum Callable {
    Global(GlobalHandler),
    Method { handler: MethodHandler, receiver: HostRef },
    Function(Function),
}

impl Callable {
    pub fn call(&self, args: Vec<Value>) -> CallFuture {
        match self {
            Self::Global(handler) => handler(args),
            Self::Method { handler, receiver } => handler(receiver.clone(), args),
            Self::Function(f) => f.call(args),
        }
    }
}

/// Splits at the last `.` into (namespace, name). No dot means the root
/// namespace.
fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('.').unwrap_or(("", path))
}

fn join_path(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use std::sync::atomic::Ordering;

    struct Counter {
        count: AtomicI64,
    }

    impl HostObject for Counter {
        fn kind(&self) -> &'static str {
            "Counter"
        }

        fn property(&self, name: &str) -> Option<Value> {
            match name {
                "count" => Some(Value::Int(self.count.load(Ordering::SeqCst))),
                _ => None,
            }
        }
    }

    struct Other;

    impl HostObject for Other {}

    fn registry() -> Registry {
        Registry::new()
            .global("sys.version", |_| async { Ok(Value::from("1.0")) })
            .global("sys.echo", |args: Vec<Value>| async move {
                Ok(args.into_iter().next().unwrap_or_default())
            })
            .global("sys.fail", |_| async { Err(anyhow::anyhow!("disk on fire")) })
            .global("sys.panic", |_| async { explode() })
            .global("root", |_| async { Ok(Value::Bool(true)) })
            .method::<Counter, _, _>("increment", |counter, args| async move {
                let by = args.first().and_then(Value::as_i64).unwrap_or(1);
                Ok(Value::Int(counter.count.fetch_add(by, Ordering::SeqCst) + by))
            })
    }

    fn explode() -> anyhow::Result<Value> {
        panic!("boom")
    }

    fn counter() -> Value {
        Value::host(Counter { count: AtomicI64::new(0) })
    }

    #[tokio::test]
    async fn test_global_invoke() {
        let reg = registry();
        let v = reg.invoke(None, "sys.version", vec![]).await.unwrap();
        assert_eq!(v.as_str(), Some("1.0"));

        let v = reg.invoke(None, "sys.echo", vec![Value::Int(5)]).await.unwrap();
        assert_eq!(v.as_i64(), Some(5));

        let v = reg.invoke(None, "root", vec![]).await.unwrap();
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn test_unregistered_global_paths() {
        let reg = registry();
        for path in ["sys.nope", "nope.version", "sys", "", "sys.", "sys.version.more"] {
            match reg.resolve(None, path) {
                Err(Error::InvalidMethod(p)) => assert_eq!(p, path),
                other => panic!("expected InvalidMethod for {:?}, got ok={}", path, other.is_ok()),
            }
        }
    }

    #[tokio::test]
    async fn test_instance_invoke() {
        let reg = registry();
        let target = counter();
        reg.invoke(Some(&target), "increment", vec![]).await.unwrap();
        let v = reg.invoke(Some(&target), "increment", vec![Value::Int(4)]).await.unwrap();
        assert_eq!(v.as_i64(), Some(5));
        assert_eq!(target.property("count").and_then(|v| v.as_i64()), Some(5));
    }

    #[tokio::test]
    async fn test_dotted_instance_path() {
        let reg = registry();
        let target = Value::object([("inner", Value::object([("counter", counter())]))]);
        let v = reg.invoke(Some(&target), "inner.counter.increment", vec![]).await.unwrap();
        assert_eq!(v.as_i64(), Some(1));
    }

    #[tokio::test]
    async fn test_function_property_is_callable() {
        let reg = registry();
        let target = Value::object([(
            "double",
            Value::function(|args: Vec<Value>| async move {
                Ok(Value::Int(args.first().and_then(Value::as_i64).unwrap_or(0) * 2))
            }),
        )]);
        let v = reg.invoke(Some(&target), "double", vec![Value::Int(21)]).await.unwrap();
        assert_eq!(v.as_i64(), Some(42));
    }

    #[test]
    fn test_non_callable_instance_paths() {
        let reg = registry();
        let target = counter();
        for path in ["count", "decrement", "missing.increment", "", "a..b"] {
            match reg.resolve(Some(&target), path) {
                Err(Error::InvalidInstanceMethod(p)) => assert_eq!(p, path),
                other => panic!("expected InvalidInstanceMethod for {:?}, got ok={}", path, other.is_ok()),
            }
        }
    }

    #[test]
    fn test_operations_are_per_kind() {
        let reg = registry();
        let other = Value::host(Other);
        assert!(matches!(
            reg.resolve(Some(&other), "increment"),
            Err(Error::InvalidInstanceMethod(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_become_invocation_errors() {
        let reg = registry();
        let err = reg.invoke(None, "sys.fail", vec![]).await.unwrap_err();
        assert_eq!(err, Error::Invocation("disk on fire".into()));

        let err = reg.invoke(None, "sys.panic", vec![]).await.unwrap_err();
        assert_eq!(err, Error::Invocation("handler panicked: boom".into()));
    }

    #[test]
    fn test_global_paths_listing() {
        let paths = registry().global_paths();
        assert_eq!(paths, vec!["root", "sys.echo", "sys.fail", "sys.panic", "sys.version"]);
        assert_eq!(registry().kind_count(), 1);
    }
}
