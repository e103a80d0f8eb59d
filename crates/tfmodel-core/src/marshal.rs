//! Conversion between host values and tensor buffers.
//!
//! Decoding accepts an object whose entries are either booleans or
//! `{ dim: number[], data: TypedArray }` objects:
//!
//! - a boolean becomes a zero-rank [`ElementKind::Bool`] tensor of one byte;
//! - a typed buffer with 1-byte elements becomes [`ElementKind::UInt8`],
//!   anything wider becomes [`ElementKind::Float32`] over the same bytes;
//! - the byte length must equal `product(dim) * element_size`, with an empty
//!   `dim` counting as one element.
//!
//! Encoding produces `{ name: { dim, data: Float32Array } }` in the order the
//! outputs were requested.

use crate::error::{Error, Result};
use crate::tensor::{NamedTensor, OutputTensor, TensorBuffer};
use crate::types::ElementKind;
use crate::value::{HostObject, HostValue, TypedArray};

/// Decode the `inputs` argument of `execute` into named tensors, in key order.
pub fn decode_inputs(value: &HostValue) -> Result<Vec<NamedTensor>> {
    let entries = value.as_object().ok_or_else(|| {
        Error::input(format!("inputs must be an object, got {}", value.type_name()))
    })?;

    entries
        .iter()
        .map(|(name, entry)| decode_entry(name, entry).map(|buf| NamedTensor::new(name, buf)))
        .collect()
}

fn decode_entry(name: &str, entry: &HostValue) -> Result<TensorBuffer> {
    match entry {
        HostValue::Bool(b) => Ok(TensorBuffer::scalar_bool(*b)),
        HostValue::Object(obj) => decode_shaped(name, obj),
        other => Err(Error::input(format!(
            "input '{}' must be a boolean or an object with 'dim' and 'data', got {}",
            name,
            other.type_name()
        ))),
    }
}

fn decode_shaped(name: &str, obj: &HostObject) -> Result<TensorBuffer> {
    let dim = obj
        .get("dim")
        .ok_or_else(|| Error::input(format!("input '{}' is missing 'dim'", name)))?;
    let data = obj
        .get("data")
        .ok_or_else(|| Error::input(format!("input '{}' is missing 'data'", name)))?;

    let dims = decode_dims(name, dim)?;
    let data: &TypedArray = data.as_typed_array().ok_or_else(|| {
        Error::input(format!(
            "input '{}': 'data' must be a typed array, got {}",
            name,
            data.type_name()
        ))
    })?;

    let kind = ElementKind::for_element_width(data.kind().bytes_per_element());
    TensorBuffer::new(kind, dims, data.as_bytes().to_vec())
        .map_err(|e| Error::input(format!("input '{}': {}", name, strip_prefix(&e))))
}

fn decode_dims(name: &str, dim: &HostValue) -> Result<Vec<i64>> {
    let items = dim.as_array().ok_or_else(|| {
        Error::input(format!(
            "input '{}': 'dim' must be an array, got {}",
            name,
            dim.type_name()
        ))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(axis, item)| {
            item.as_f64()
                .filter(|d| d.fract() == 0.0 && *d >= 0.0 && *d <= i64::MAX as f64)
                .map(|d| d as i64)
                .ok_or_else(|| {
                    Error::input(format!(
                        "input '{}': dim[{}] must be a non-negative integer",
                        name, axis
                    ))
                })
        })
        .collect()
}

// Messages from `TensorBuffer::new` already carry the variant prefix.
fn strip_prefix(err: &Error) -> String {
    match err {
        Error::InputFormat(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Decode the `output_names` argument of `execute`.
pub fn decode_output_names(value: &HostValue) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| {
        Error::input(format!(
            "output names must be an array, got {}",
            value.type_name()
        ))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                Error::input(format!("output name #{} must be a string", i))
            })
        })
        .collect()
}

/// Encode results as `{ name: { dim, data } }`, preserving their order.
pub fn encode_outputs(outputs: Vec<OutputTensor>) -> HostValue {
    let mut result = HostObject::new();
    for output in outputs {
        let (name, dims, data) = output.into_parts();
        let dim = HostValue::Array(dims.into_iter().map(|d| HostValue::Number(d as f64)).collect());
        let entry = HostObject::new()
            .with("dim", dim)
            .with("data", TypedArray::from_f32(&data));
        result.insert(name, entry);
    }
    HostValue::Object(result)
}
