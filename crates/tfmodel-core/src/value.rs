//! Loosely-typed values as seen by the host environment.
//!
//! Requests arrive as a [`HostValue`] tree: an object mapping input names to
//! either a boolean or a `{ dim, data }` object whose `data` is a typed
//! buffer. Results are handed back in the same shape.

use serde_json::Value as JsonValue;

/// A structured value owned by the host environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Absent value (the result of operations with no payload).
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any number; hosts of this kind have a single float number type.
    Number(f64),
    /// String.
    String(String),
    /// Ordered sequence.
    Array(Vec<HostValue>),
    /// Insertion-ordered mapping.
    Object(HostObject),
    /// Typed numeric buffer.
    TypedArray(TypedArray),
}

impl HostValue {
    /// Borrow as an object, if this is one.
    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrow as an array, if this is one.
    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a typed buffer, if this is one.
    pub fn as_typed_array(&self) -> Option<&TypedArray> {
        match self {
            HostValue::TypedArray(arr) => Some(arr),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric payload, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::TypedArray(_) => "typed array",
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<HostObject> for HostValue {
    fn from(obj: HostObject) -> Self {
        HostValue::Object(obj)
    }
}

impl From<TypedArray> for HostValue {
    fn from(arr: TypedArray) -> Self {
        HostValue::TypedArray(arr)
    }
}

impl From<JsonValue> for HostValue {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => HostValue::Null,
            JsonValue::Bool(b) => HostValue::Bool(b),
            JsonValue::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => HostValue::String(s),
            JsonValue::Array(items) => {
                HostValue::Array(items.into_iter().map(HostValue::from).collect())
            }
            JsonValue::Object(map) => {
                let mut obj = HostObject::new();
                for (key, value) in map {
                    obj.insert(key, HostValue::from(value));
                }
                HostValue::Object(obj)
            }
        }
    }
}

/// Object whose keys keep their insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostObject {
    entries: Vec<(String, HostValue)>,
}

impl HostObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`. An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HostValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the object has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Element type of a host typed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl TypedArrayKind {
    /// Width of one element in bytes.
    pub const fn bytes_per_element(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 | TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => 8,
        }
    }
}

/// Typed numeric buffer: an element kind plus native-endian bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    kind: TypedArrayKind,
    bytes: Vec<u8>,
}

impl TypedArray {
    /// Wrap raw bytes. Trailing bytes that do not form a whole element are
    /// kept; the marshaller rejects them through its length check.
    pub fn from_bytes(kind: TypedArrayKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    /// A `Float32Array` with the given contents.
    pub fn from_f32(values: &[f32]) -> Self {
        Self::from_bytes(TypedArrayKind::Float32, bytemuck::cast_slice(values).to_vec())
    }

    /// A `Uint8Array` with the given contents.
    pub fn from_u8(values: &[u8]) -> Self {
        Self::from_bytes(TypedArrayKind::Uint8, values.to_vec())
    }

    /// A `Float64Array` with the given contents.
    pub fn from_f64(values: &[f64]) -> Self {
        Self::from_bytes(TypedArrayKind::Float64, bytemuck::cast_slice(values).to_vec())
    }

    /// Element kind.
    pub fn kind(&self) -> TypedArrayKind {
        self.kind
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Length in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of whole elements.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.bytes_per_element()
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contents as `f32`, if this is a `Float32Array`.
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        if self.kind != TypedArrayKind::Float32 {
            return None;
        }
        Some(
            self.bytes
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect(),
        )
    }
}
