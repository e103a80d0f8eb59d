//! tfmodel runtime: non-blocking graph loading and inference.
//!
//! Bridges a host environment that must never block to a native tensor
//! engine whose calls do:
//! - **Engine**: the engine's C API as an `unsafe` trait ([`Engine`])
//! - **Handles**: owning wrappers that release every native handle on drop
//! - **Sessions**: loading a graph file into a runnable session
//! - **Bridge**: background execution with results delivered to the awaiting task
//! - **Model**: the [`TfModel`] facade with `load` and `execute`
//!
//! With the `tensorflow` feature the crate links `libtensorflow` and
//! provides [`engine::tensorflow::TensorFlow`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod context;
pub mod engine;
pub mod handle;
pub mod model;
pub mod session;

pub use bridge::{ExecutionBridge, Pending};
pub use context::RequestContext;
pub use engine::{Code, DataType, Engine};
pub use handle::EngineRef;
pub use model::TfModel;
pub use session::{LoadedSession, SessionId, SessionSlot, SessionState, SessionStatistics};

// Re-export the host-facing core types
pub use tfmodel_core::{Error, ErrorKind, HostObject, HostValue, ModelOptions, Result, TypedArray};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{Engine, TfModel};
    pub use tfmodel_core::{HostObject, HostValue, ModelOptions, TypedArray};
}
