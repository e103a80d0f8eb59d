//! Model options and the serialized session configuration handed to the engine.
//!
//! The engine takes its session configuration as an opaque protobuf payload
//! (a `ConfigProto`). Only two options are ever set, both inside
//! `ConfigProto.gpu_options`:
//!
//! | option | field | wire bytes |
//! |---|---|---|
//! | `allow_growth` | `GPUOptions.allow_growth` (4, bool) | `32 02 20 01` |
//! | memory fraction | `GPUOptions.per_process_gpu_memory_fraction` (1, double) | `32 09 09 <f64 LE>` |
//!
//! The message layout is an external contract owned by the engine.

use crate::error::{Error, Result};
use crate::value::HostValue;
use prost::Message;
use serde::Deserialize;

/// Options accepted when constructing a model.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Let the engine grow GPU memory on demand instead of reserving it up front.
    pub allow_growth: bool,
    /// Fraction of GPU memory the process may reserve, in `(0, 1]`.
    pub gpu_memory_fraction: f64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            allow_growth: false,
            gpu_memory_fraction: 1.0,
        }
    }
}

impl ModelOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `allow_growth`.
    pub fn with_allow_growth(mut self, allow: bool) -> Self {
        self.allow_growth = allow;
        self
    }

    /// Set the GPU memory fraction.
    pub fn with_gpu_memory_fraction(mut self, fraction: f64) -> Self {
        self.gpu_memory_fraction = fraction;
        self
    }

    /// Read options from the host's optional constructor argument.
    ///
    /// Anything other than an object means "no options". Present fields must
    /// have the right type.
    pub fn from_host_value(value: &HostValue) -> Result<Self> {
        let mut options = Self::default();
        let Some(obj) = value.as_object() else {
            return Ok(options);
        };

        if let Some(v) = obj.get("allow_growth") {
            options.allow_growth = v.as_bool().ok_or_else(|| {
                Error::InputFormat(format!(
                    "option 'allow_growth' must be a boolean, got {}",
                    v.type_name()
                ))
            })?;
        }
        if let Some(v) = obj.get("gpu_memory_fraction") {
            options.gpu_memory_fraction = v.as_f64().ok_or_else(|| {
                Error::InputFormat(format!(
                    "option 'gpu_memory_fraction' must be a number, got {}",
                    v.type_name()
                ))
            })?;
        }
        Ok(options)
    }

    /// Parse options from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InputFormat(format!("invalid model options: {}", e)))
    }

    /// Session configuration derived from these options.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from_options(self)
    }
}

/// `tensorflow.GPUOptions`, restricted to the fields we set.
#[derive(Clone, PartialEq, Message)]
struct GpuOptions {
    #[prost(double, tag = "1")]
    per_process_gpu_memory_fraction: f64,
    #[prost(bool, tag = "4")]
    allow_growth: bool,
}

/// `tensorflow.ConfigProto`, restricted to the fields we set.
#[derive(Clone, PartialEq, Message)]
struct ConfigProto {
    #[prost(message, optional, tag = "6")]
    gpu_options: Option<GpuOptions>,
}

/// The engine configuration selected for a session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SessionConfig {
    /// No payload; the engine uses its defaults.
    #[default]
    EngineDefault,
    /// Grow GPU memory on demand.
    AllowGrowth,
    /// Reserve this fraction of GPU memory.
    MemoryFraction(f64),
}

impl SessionConfig {
    /// Select a configuration: `allow_growth` wins, then a fraction strictly
    /// inside `(0, 1)`, otherwise engine defaults.
    pub fn from_options(options: &ModelOptions) -> Self {
        if options.allow_growth {
            SessionConfig::AllowGrowth
        } else if options.gpu_memory_fraction > 0.0 && options.gpu_memory_fraction < 1.0 {
            SessionConfig::MemoryFraction(options.gpu_memory_fraction)
        } else {
            SessionConfig::EngineDefault
        }
    }

    /// Serialized payload for the engine, or `None` for engine defaults.
    pub fn encode(&self) -> Option<Vec<u8>> {
        let gpu_options = match *self {
            SessionConfig::EngineDefault => return None,
            SessionConfig::AllowGrowth => GpuOptions {
                per_process_gpu_memory_fraction: 0.0,
                allow_growth: true,
            },
            SessionConfig::MemoryFraction(fraction) => GpuOptions {
                per_process_gpu_memory_fraction: fraction,
                allow_growth: false,
            },
        };
        let proto = ConfigProto {
            gpu_options: Some(gpu_options),
        };
        Some(proto.encode_to_vec())
    }
}
