//! Owned tensor buffers exchanged with the engine.
//!
//! A [`TensorBuffer`] is the unit of data interchange: a contiguous block of
//! bytes, an element kind and a shape. Its constructor enforces that the byte
//! length matches the shape, so everything downstream of decoding can hand
//! the bytes to the engine without re-checking.

use crate::error::{Error, Result};
use crate::types::{element_count, ElementKind};

/// Owned, typed, contiguous tensor data with a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBuffer {
    kind: ElementKind,
    dims: Vec<i64>,
    bytes: Vec<u8>,
}

impl TensorBuffer {
    /// Create a buffer, validating `bytes.len() == product(dims) * kind.size()`.
    ///
    /// # Example
    /// ```rust
    /// use tfmodel_core::{ElementKind, TensorBuffer};
    ///
    /// let buf = TensorBuffer::new(ElementKind::UInt8, vec![2, 2], vec![1, 2, 3, 4])?;
    /// assert_eq!(buf.element_count(), 4);
    /// # Ok::<(), tfmodel_core::Error>(())
    /// ```
    pub fn new(kind: ElementKind, dims: Vec<i64>, bytes: Vec<u8>) -> Result<Self> {
        if kind == ElementKind::Bool {
            if !dims.is_empty() || bytes.len() != 1 {
                return Err(Error::InputFormat(format!(
                    "bool tensors are single-byte scalars, got dims {:?} with {} bytes",
                    dims,
                    bytes.len()
                )));
            }
            return Ok(Self { kind, dims, bytes });
        }

        let count = element_count(&dims).ok_or_else(|| {
            Error::InputFormat(format!("invalid tensor shape {:?}", dims))
        })?;
        let expected = count.checked_mul(kind.size()).ok_or_else(|| {
            Error::InputFormat(format!("tensor shape {:?} is too large", dims))
        })?;

        if bytes.len() != expected {
            return Err(Error::InputFormat(format!(
                "data length mismatch for shape {:?} ({}): expected {} bytes, got {}",
                dims,
                kind,
                expected,
                bytes.len()
            )));
        }

        Ok(Self { kind, dims, bytes })
    }

    /// Zero-rank boolean tensor holding one byte.
    pub fn scalar_bool(value: bool) -> Self {
        Self {
            kind: ElementKind::Bool,
            dims: Vec::new(),
            bytes: vec![u8::from(value)],
        }
    }

    /// Float tensor from `f32` values.
    pub fn from_f32(dims: Vec<i64>, values: &[f32]) -> Result<Self> {
        Self::new(ElementKind::Float32, dims, bytemuck::cast_slice(values).to_vec())
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Shape; empty for scalars.
    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the payload in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of elements; 1 for scalars.
    pub fn element_count(&self) -> usize {
        self.bytes.len() / self.kind.size()
    }

    /// Truth value of a boolean scalar.
    pub fn as_bool(&self) -> Option<bool> {
        (self.kind == ElementKind::Bool).then(|| self.bytes[0] != 0)
    }
}

/// An input tensor bound to a graph operation name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    name: String,
    buffer: TensorBuffer,
}

impl NamedTensor {
    /// Bind `buffer` to the operation `name`.
    pub fn new(name: impl Into<String>, buffer: TensorBuffer) -> Self {
        Self {
            name: name.into(),
            buffer,
        }
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tensor data.
    pub fn buffer(&self) -> &TensorBuffer {
        &self.buffer
    }
}

/// A result tensor, always materialised as 32-bit floats.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    name: String,
    dims: Vec<i64>,
    data: Vec<f32>,
}

impl OutputTensor {
    /// Build from a native result: `datasize = product(dims)` floats are read
    /// from `bytes` reinterpreted as native-endian `f32`.
    ///
    /// The engine's element type is not consulted. When `bytes` is shorter
    /// than `datasize * 4` (a non-float output) the tail is zero-filled, so the
    /// values are meaningless but no read goes past the native buffer.
    pub fn from_native(name: impl Into<String>, dims: Vec<i64>, bytes: &[u8]) -> Self {
        let name = name.into();
        // A negative extent from the engine would be a bug on its side; treat as empty.
        let datasize = element_count(&dims).unwrap_or(0);
        let mut data = vec![0f32; datasize];

        let wanted = datasize * std::mem::size_of::<f32>();
        let available = wanted.min(bytes.len());
        if available < wanted {
            tracing::warn!(
                output = %name,
                expected_bytes = wanted,
                native_bytes = bytes.len(),
                "output tensor is smaller than its float32 view, zero-filling"
            );
        }
        bytemuck::cast_slice_mut::<f32, u8>(&mut data)[..available]
            .copy_from_slice(&bytes[..available]);

        Self { name, dims, data }
    }

    /// Requested operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Result shape as reported by the engine.
    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    /// Result values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Split into name, shape and values.
    pub fn into_parts(self) -> (String, Vec<i64>, Vec<f32>) {
        (self.name, self.dims, self.data)
    }
}
