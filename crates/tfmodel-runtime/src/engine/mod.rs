//! Seam to the native tensor engine.
//!
//! [`Engine`] mirrors the engine's C API one call per method, over opaque
//! handle pointers. Nothing here manages lifetimes; the safe owning wrappers
//! live in [`crate::handle`] and are the only callers of these methods.
//!
//! The real binding to `libtensorflow` is behind the `tensorflow` feature.

use std::ffi::{c_int, c_void, CStr};
use std::fmt;
use tfmodel_core::ElementKind;

#[cfg(feature = "tensorflow")]
pub mod tensorflow;

macro_rules! opaque_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque_handle! {
    /// `TF_Status`.
    RawStatus;
    /// `TF_Graph`.
    RawGraph;
    /// `TF_Operation`.
    RawOperation;
    /// `TF_SessionOptions`.
    RawSessionOptions;
    /// `TF_Session`.
    RawSession;
    /// `TF_Tensor`.
    RawTensor;
}

/// `TF_Output`: one output endpoint of an operation.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawOutput {
    /// Operation handle, owned by its graph.
    pub oper: *mut RawOperation,
    /// Output index on that operation.
    pub index: c_int,
}

/// Called by the engine when it no longer needs a tensor's data buffer.
pub type Deallocator = unsafe extern "C" fn(data: *mut c_void, len: usize, arg: *mut c_void);

/// Deallocator for buffers the caller keeps ownership of.
pub unsafe extern "C" fn noop_deallocator(_data: *mut c_void, _len: usize, _arg: *mut c_void) {}

/// Engine status code (`TF_Code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
    Other(i32),
}

impl Code {
    /// Map a raw `TF_Code` value.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            other => Code::Other(other),
        }
    }

    /// Raw `TF_Code` value.
    pub fn to_raw(self) -> i32 {
        match self {
            Code::Ok => 0,
            Code::Cancelled => 1,
            Code::Unknown => 2,
            Code::InvalidArgument => 3,
            Code::DeadlineExceeded => 4,
            Code::NotFound => 5,
            Code::AlreadyExists => 6,
            Code::PermissionDenied => 7,
            Code::ResourceExhausted => 8,
            Code::FailedPrecondition => 9,
            Code::Aborted => 10,
            Code::OutOfRange => 11,
            Code::Unimplemented => 12,
            Code::Internal => 13,
            Code::Unavailable => 14,
            Code::DataLoss => 15,
            Code::Unauthenticated => 16,
            Code::Other(other) => other,
        }
    }

    /// Whether this is `Ok`.
    pub fn is_ok(self) -> bool {
        self == Code::Ok
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Engine element type (`TF_DataType`), limited to what crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// `TF_FLOAT`
    Float,
    /// `TF_UINT8`
    UInt8,
    /// `TF_BOOL`
    Bool,
}

impl DataType {
    /// Raw `TF_DataType` value.
    pub const fn to_raw(self) -> c_int {
        match self {
            DataType::Float => 1,
            DataType::UInt8 => 4,
            DataType::Bool => 10,
        }
    }

    /// Map a raw `TF_DataType` value.
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            1 => Some(DataType::Float),
            4 => Some(DataType::UInt8),
            10 => Some(DataType::Bool),
            _ => None,
        }
    }
}

impl From<ElementKind> for DataType {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Bool => DataType::Bool,
            ElementKind::UInt8 => DataType::UInt8,
            ElementKind::Float32 => DataType::Float,
        }
    }
}

/// The engine's C API.
///
/// # Safety
///
/// Implementations must behave like the C API they stand for: handles
/// returned by `new_*` stay valid until the matching `delete_*`, every
/// `status` argument receives the outcome of the call, and `new_tensor`
/// calls `deallocator` exactly once when it is done with `data`.
///
/// Callers of the `unsafe` methods must pass live handles created by the
/// same engine.
pub unsafe trait Engine: Send + Sync + 'static {
    /// Human-readable engine name and version.
    fn name(&self) -> String;

    /// `TF_NewStatus`.
    fn new_status(&self) -> *mut RawStatus;
    /// `TF_DeleteStatus`.
    unsafe fn delete_status(&self, status: *mut RawStatus);
    /// `TF_GetCode`.
    unsafe fn status_code(&self, status: *const RawStatus) -> Code;
    /// `TF_Message`.
    unsafe fn status_message(&self, status: *const RawStatus) -> String;

    /// `TF_NewGraph`.
    fn new_graph(&self) -> *mut RawGraph;
    /// `TF_DeleteGraph`.
    unsafe fn delete_graph(&self, graph: *mut RawGraph);
    /// `TF_GraphImportGraphDef` with an import prefix.
    ///
    /// The engine may keep referencing `graph_def` for the lifetime of `graph`.
    unsafe fn import_graph_def(
        &self,
        graph: *mut RawGraph,
        graph_def: &[u8],
        prefix: &CStr,
        status: *mut RawStatus,
    );
    /// `TF_GraphOperationByName`; null when absent.
    unsafe fn operation_by_name(&self, graph: *mut RawGraph, name: &CStr) -> *mut RawOperation;

    /// `TF_NewSessionOptions`.
    fn new_session_options(&self) -> *mut RawSessionOptions;
    /// `TF_DeleteSessionOptions`.
    unsafe fn delete_session_options(&self, options: *mut RawSessionOptions);
    /// `TF_SetConfig`.
    unsafe fn set_config(
        &self,
        options: *mut RawSessionOptions,
        proto: &[u8],
        status: *mut RawStatus,
    );

    /// `TF_NewSession`.
    unsafe fn new_session(
        &self,
        graph: *mut RawGraph,
        options: *const RawSessionOptions,
        status: *mut RawStatus,
    ) -> *mut RawSession;
    /// `TF_CloseSession`.
    unsafe fn close_session(&self, session: *mut RawSession, status: *mut RawStatus);
    /// `TF_DeleteSession`.
    unsafe fn delete_session(&self, session: *mut RawSession, status: *mut RawStatus);
    /// `TF_SessionRun` without run options, targets or metadata.
    ///
    /// `output_values` must have the same length as `outputs`; on success each
    /// slot holds a new tensor owned by the caller.
    unsafe fn session_run(
        &self,
        session: *mut RawSession,
        inputs: &[RawOutput],
        input_values: &[*mut RawTensor],
        outputs: &[RawOutput],
        output_values: &mut [*mut RawTensor],
        status: *mut RawStatus,
    );

    /// `TF_NewTensor` over caller-provided data.
    unsafe fn new_tensor(
        &self,
        dtype: DataType,
        dims: &[i64],
        data: *mut c_void,
        len: usize,
        deallocator: Deallocator,
        deallocator_arg: *mut c_void,
    ) -> *mut RawTensor;
    /// `TF_DeleteTensor`.
    unsafe fn delete_tensor(&self, tensor: *mut RawTensor);
    /// `TF_NumDims`.
    unsafe fn num_dims(&self, tensor: *const RawTensor) -> c_int;
    /// `TF_Dim`.
    unsafe fn dim(&self, tensor: *const RawTensor, index: c_int) -> i64;
    /// `TF_TensorByteSize`.
    unsafe fn tensor_byte_size(&self, tensor: *const RawTensor) -> usize;
    /// `TF_TensorData`.
    unsafe fn tensor_data(&self, tensor: *const RawTensor) -> *mut c_void;
}
