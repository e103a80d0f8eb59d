//! Binding to the TensorFlow C API (`libtensorflow`).

use super::{
    Code, DataType, Deallocator, Engine, RawGraph, RawOperation, RawOutput, RawSession,
    RawSessionOptions, RawStatus, RawTensor,
};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

#[repr(C)]
struct TfBuffer {
    data: *const c_void,
    length: usize,
    data_deallocator: Option<unsafe extern "C" fn(data: *mut c_void, length: usize)>,
}

#[repr(C)]
struct RawImportOptions {
    _private: [u8; 0],
}

#[link(name = "tensorflow")]
extern "C" {
    fn TF_Version() -> *const c_char;

    fn TF_NewStatus() -> *mut RawStatus;
    fn TF_DeleteStatus(status: *mut RawStatus);
    fn TF_GetCode(status: *const RawStatus) -> c_int;
    fn TF_Message(status: *const RawStatus) -> *const c_char;

    fn TF_NewGraph() -> *mut RawGraph;
    fn TF_DeleteGraph(graph: *mut RawGraph);
    fn TF_NewImportGraphDefOptions() -> *mut RawImportOptions;
    fn TF_DeleteImportGraphDefOptions(options: *mut RawImportOptions);
    fn TF_ImportGraphDefOptionsSetPrefix(options: *mut RawImportOptions, prefix: *const c_char);
    fn TF_GraphImportGraphDef(
        graph: *mut RawGraph,
        graph_def: *const TfBuffer,
        options: *const RawImportOptions,
        status: *mut RawStatus,
    );
    fn TF_GraphOperationByName(graph: *mut RawGraph, name: *const c_char) -> *mut RawOperation;

    fn TF_NewSessionOptions() -> *mut RawSessionOptions;
    fn TF_DeleteSessionOptions(options: *mut RawSessionOptions);
    fn TF_SetConfig(
        options: *mut RawSessionOptions,
        proto: *const c_void,
        proto_len: usize,
        status: *mut RawStatus,
    );

    fn TF_NewSession(
        graph: *mut RawGraph,
        options: *const RawSessionOptions,
        status: *mut RawStatus,
    ) -> *mut RawSession;
    fn TF_CloseSession(session: *mut RawSession, status: *mut RawStatus);
    fn TF_DeleteSession(session: *mut RawSession, status: *mut RawStatus);
    #[allow(clippy::too_many_arguments)]
    fn TF_SessionRun(
        session: *mut RawSession,
        run_options: *const c_void,
        inputs: *const RawOutput,
        input_values: *const *mut RawTensor,
        ninputs: c_int,
        outputs: *const RawOutput,
        output_values: *mut *mut RawTensor,
        noutputs: c_int,
        target_opers: *const *const RawOperation,
        ntargets: c_int,
        run_metadata: *mut c_void,
        status: *mut RawStatus,
    );

    fn TF_NewTensor(
        dtype: c_int,
        dims: *const i64,
        num_dims: c_int,
        data: *mut c_void,
        len: usize,
        deallocator: Deallocator,
        deallocator_arg: *mut c_void,
    ) -> *mut RawTensor;
    fn TF_DeleteTensor(tensor: *mut RawTensor);
    fn TF_NumDims(tensor: *const RawTensor) -> c_int;
    fn TF_Dim(tensor: *const RawTensor, index: c_int) -> i64;
    fn TF_TensorByteSize(tensor: *const RawTensor) -> usize;
    fn TF_TensorData(tensor: *const RawTensor) -> *mut c_void;
}

/// The TensorFlow C API, linked at build time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TensorFlow;

// SAFETY: every method forwards to the C function of the same name.
unsafe impl Engine for TensorFlow {
    fn name(&self) -> String {
        // SAFETY: TF_Version returns a static NUL-terminated string.
        let version = unsafe { CStr::from_ptr(TF_Version()) };
        format!("tensorflow {}", version.to_string_lossy())
    }

    fn new_status(&self) -> *mut RawStatus {
        unsafe { TF_NewStatus() }
    }

    unsafe fn delete_status(&self, status: *mut RawStatus) {
        TF_DeleteStatus(status)
    }

    unsafe fn status_code(&self, status: *const RawStatus) -> Code {
        Code::from_raw(TF_GetCode(status))
    }

    unsafe fn status_message(&self, status: *const RawStatus) -> String {
        let msg = TF_Message(status);
        if msg.is_null() {
            return String::new();
        }
        CStr::from_ptr(msg).to_string_lossy().into_owned()
    }

    fn new_graph(&self) -> *mut RawGraph {
        unsafe { TF_NewGraph() }
    }

    unsafe fn delete_graph(&self, graph: *mut RawGraph) {
        TF_DeleteGraph(graph)
    }

    unsafe fn import_graph_def(
        &self,
        graph: *mut RawGraph,
        graph_def: &[u8],
        prefix: &CStr,
        status: *mut RawStatus,
    ) {
        let buffer = TfBuffer {
            data: graph_def.as_ptr().cast(),
            length: graph_def.len(),
            data_deallocator: None,
        };
        let options = TF_NewImportGraphDefOptions();
        TF_ImportGraphDefOptionsSetPrefix(options, prefix.as_ptr());
        TF_GraphImportGraphDef(graph, &buffer, options, status);
        TF_DeleteImportGraphDefOptions(options);
    }

    unsafe fn operation_by_name(&self, graph: *mut RawGraph, name: &CStr) -> *mut RawOperation {
        TF_GraphOperationByName(graph, name.as_ptr())
    }

    fn new_session_options(&self) -> *mut RawSessionOptions {
        unsafe { TF_NewSessionOptions() }
    }

    unsafe fn delete_session_options(&self, options: *mut RawSessionOptions) {
        TF_DeleteSessionOptions(options)
    }

    unsafe fn set_config(
        &self,
        options: *mut RawSessionOptions,
        proto: &[u8],
        status: *mut RawStatus,
    ) {
        TF_SetConfig(options, proto.as_ptr().cast(), proto.len(), status)
    }

    unsafe fn new_session(
        &self,
        graph: *mut RawGraph,
        options: *const RawSessionOptions,
        status: *mut RawStatus,
    ) -> *mut RawSession {
        TF_NewSession(graph, options, status)
    }

    unsafe fn close_session(&self, session: *mut RawSession, status: *mut RawStatus) {
        TF_CloseSession(session, status)
    }

    unsafe fn delete_session(&self, session: *mut RawSession, status: *mut RawStatus) {
        TF_DeleteSession(session, status)
    }

    unsafe fn session_run(
        &self,
        session: *mut RawSession,
        inputs: &[RawOutput],
        input_values: &[*mut RawTensor],
        outputs: &[RawOutput],
        output_values: &mut [*mut RawTensor],
        status: *mut RawStatus,
    ) {
        debug_assert_eq!(inputs.len(), input_values.len());
        debug_assert_eq!(outputs.len(), output_values.len());
        TF_SessionRun(
            session,
            ptr::null(),
            inputs.as_ptr(),
            input_values.as_ptr(),
            inputs.len() as c_int,
            outputs.as_ptr(),
            output_values.as_mut_ptr(),
            outputs.len() as c_int,
            ptr::null(),
            0,
            ptr::null_mut(),
            status,
        )
    }

    unsafe fn new_tensor(
        &self,
        dtype: DataType,
        dims: &[i64],
        data: *mut c_void,
        len: usize,
        deallocator: Deallocator,
        deallocator_arg: *mut c_void,
    ) -> *mut RawTensor {
        TF_NewTensor(
            dtype.to_raw(),
            dims.as_ptr(),
            dims.len() as c_int,
            data,
            len,
            deallocator,
            deallocator_arg,
        )
    }

    unsafe fn delete_tensor(&self, tensor: *mut RawTensor) {
        TF_DeleteTensor(tensor)
    }

    unsafe fn num_dims(&self, tensor: *const RawTensor) -> c_int {
        TF_NumDims(tensor)
    }

    unsafe fn dim(&self, tensor: *const RawTensor, index: c_int) -> i64 {
        TF_Dim(tensor, index)
    }

    unsafe fn tensor_byte_size(&self, tensor: *const RawTensor) -> usize {
        TF_TensorByteSize(tensor)
    }

    unsafe fn tensor_data(&self, tensor: *const RawTensor) -> *mut c_void {
        TF_TensorData(tensor)
    }
}
