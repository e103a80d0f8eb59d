//! tfmodel core: host values, tensor buffers and marshalling.
//!
//! This crate holds everything that does not touch the native engine:
//! - **Values**: the loosely-typed data a host environment passes in and gets back
//! - **Tensors**: owned, typed, shape-checked byte buffers
//! - **Marshalling**: conversion between the two, in both directions
//! - **Config**: model options and the serialized session configuration
//!
//! ## Example
//!
//! ```rust
//! use tfmodel_core::{decode_inputs, ElementKind, HostObject, HostValue, TypedArray};
//!
//! let dim = HostValue::Array(vec![HostValue::Number(1.0), HostValue::Number(3.0)]);
//! let input = HostObject::new()
//!     .with("dim", dim)
//!     .with("data", TypedArray::from_f32(&[0.1, 0.2, 0.3]));
//! let inputs: HostValue = HostObject::new().with("input", input).into();
//!
//! let tensors = decode_inputs(&inputs)?;
//! assert_eq!(tensors[0].buffer().kind(), ElementKind::Float32);
//! assert_eq!(tensors[0].buffer().byte_len(), 12);
//! # Ok::<(), tfmodel_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod logging;
pub mod marshal;
pub mod tensor;
pub mod types;
pub mod value;

pub use config::{ModelOptions, SessionConfig};
pub use error::{Error, ErrorKind, Result};
pub use marshal::{decode_inputs, decode_output_names, encode_outputs};
pub use tensor::{NamedTensor, OutputTensor, TensorBuffer};
pub use types::{element_count, ElementKind};
pub use value::{HostObject, HostValue, TypedArray, TypedArrayKind};
