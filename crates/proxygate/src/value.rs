//! # Gateway Values
//!
//! The dynamic value model that flows through invocations: arguments decoded
//! from JSON, results returned by host handlers, and entries retained in the
//! proxy table.
//!
//! ## Philosophy
//!
//! - **Shared Composites**: `Array` and `Object` are reference-counted and
//!   interior-mutable, so two slots can alias the same node and a node can
//!   (directly or not) contain itself. The serializer deals with that; nothing
//!   else tries to.
//! - **Identity**: Composites, functions and host objects have identity
//!   (`ptr_eq`). Primitives do not.
//! - **Closed Host Surface**: Host objects are opaque except for what their
//!   [`HostObject`] impl exposes and what the registry declares for their kind.

use std::any::Any;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value as Json;

/// The future returned by every callable in the gateway.
pub type CallFuture = BoxFuture<'static, anyhow::Result<Value>>;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Array),
    Object(Object),
    Function(Function),
    Host(HostRef),
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(Array::new(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(Object::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn host<T: HostObject>(object: T) -> Self {
        Self::Host(HostRef::new(object))
    }

    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Function(Function::new(f))
    }

    /// Converts decoded JSON into fresh, unaliased values.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Json::String(s) => Self::String(s.clone()),
            Json::Array(items) => Self::array(items.iter().map(Self::from_json)),
            Json::Object(map) => Self::object(map.iter().map(|(k, v)| (k.clone(), Self::from_json(v)))),
        }
    }

    /// Serializes into plain JSON. See [`crate::serialize::serialize`].
    pub fn to_json(&self) -> Option<Json> {
        crate::serialize::serialize(self)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostRef> {
        match self {
            Self::Host(h) => Some(h),
            _ => None,
        }
    }

    /// Returns the concrete host object if this value holds one of kind `T`.
    pub fn downcast<T: HostObject>(&self) -> Option<Arc<T>> {
        self.as_host().and_then(HostRef::downcast::<T>)
    }

    /// Looks up a named property: object keys, array indices and `length`,
    /// and whatever a host object chooses to expose.
    pub fn property(&self, name: &str) -> Option<Value> {
        match self {
            Self::Object(o) => o.get(name),
            Self::Array(a) if name == "length" => Some(Self::Int(a.len() as i64)),
            Self::Array(a) => name.parse::<usize>().ok().and_then(|idx| a.get(idx)),
            Self::Host(h) => h.property(name),
            _ => None,
        }
    }

    /// A short description of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
            Self::Host(h) => h.kind(),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::from_json(&json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<HostRef> for Value {
    fn from(h: HostRef) -> Self {
        Self::Host(h)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A shared, growable list.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        read(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.0).is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Value> {
        read(&self.0).get(idx).cloned()
    }

    pub fn push(&self, value: Value) {
        write(&self.0).push(value);
    }

    pub fn set(&self, idx: usize, value: Value) {
        let mut items = write(&self.0);
        if idx >= items.len() {
            items.resize(idx + 1, Value::Undefined);
        }
        items[idx] = value;
    }

    /// A point-in-time copy of the slots. Composite slots still alias.
    pub fn items(&self) -> Vec<Value> {
        read(&self.0).clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Array(len={})", self.len())
    }
}

/// A shared map with string keys.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<BTreeMap<String, Value>>>);

impl Object {
    pub fn new(entries: BTreeMap<String, Value>) -> Self {
        Self(Arc::new(RwLock::new(entries)))
    }

    pub fn len(&self) -> usize {
        read(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.0).is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        read(&self.0).get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        write(&self.0).insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        write(&self.0).remove(key)
    }

    /// A point-in-time copy of the entries. Composite values still alias.
    pub fn entries(&self) -> Vec<(String, Value)> {
        read(&self.0).iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object(len={})", self.len())
    }
}

/// An async callable with identity.
///
/// Listener callbacks created by the bridge are functions, and host objects
/// keep them to call back later. Two clones of one function are `ptr_eq`.
#[derive(Clone)]
pub struct Function(Arc<dyn Fn(Vec<Value>) -> CallFuture + Send + Sync>);

impl Function {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self(Arc::new(move |args| f(args).boxed()))
    }

    pub fn call(&self, args: Vec<Value>) -> CallFuture {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Function({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// An object living in the hosting process that peers may drive.
///
/// Operations callable on a kind are declared in the
/// [`Registry`](crate::registry::Registry); this trait only covers how the
/// object looks from the outside.
pub trait HostObject: Send + Sync + 'static {
    /// Kind name used in logs and error messages.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// A property readable through dotted method paths.
    fn property(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// The data view sent to peers when this object is a result.
    fn snapshot(&self) -> Value {
        Value::Object(Object::default())
    }
}

/// A type-erased, cloneable reference to a host object.
#[derive(Clone)]
pub struct HostRef {
    object: Arc<dyn HostObject>,
    any: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
}

impl HostRef {
    pub fn new<T: HostObject>(object: T) -> Self {
        Self::from_arc(Arc::new(object))
    }

    pub fn from_arc<T: HostObject>(object: Arc<T>) -> Self {
        Self {
            object: object.clone(),
            any: object,
            type_id: TypeId::of::<T>(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.object.kind()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn downcast<T: HostObject>(&self) -> Option<Arc<T>> {
        self.any.clone().downcast::<T>().ok()
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.object.property(name)
    }

    pub fn snapshot(&self) -> Value {
        self.object.snapshot()
    }

    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.any) as *const () as usize
    }
}

impl std::fmt::Debug for HostRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Host({})", self.kind())
    }
}
