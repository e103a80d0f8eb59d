//! In-process engine for integration tests.
//!
//! Graphs are plain text, one node per line:
//!
//! ```text
//! placeholder input
//! sum output input 10      # [1, 10] floats: sum(input) + index
//! identity echo input
//! ```
//!
//! Every handle the engine hands out is counted so tests can assert that
//! nothing leaks, and teardown calls are recorded in order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::{c_int, c_void, CStr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tempfile::TempDir;
use tfmodel_core::logging::{init_logging, LoggingConfig};
use tfmodel_core::{HostObject, HostValue, TypedArray};
use tfmodel_runtime::engine::{
    Deallocator, RawGraph, RawOperation, RawOutput, RawSession, RawSessionOptions, RawStatus,
    RawTensor,
};
use tfmodel_runtime::{Code, DataType, Engine, EngineRef};

/// A two-node graph shaped like an mnist classifier: `input` -> `output` [1, 10].
pub const MNIST_GRAPH: &str = "placeholder input\nsum output input 10\n";

/// Live handle counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LiveHandles {
    pub statuses: usize,
    pub graphs: usize,
    pub options: usize,
    pub sessions: usize,
    pub tensors: usize,
}

/// A tensor the engine received as a run input.
#[derive(Debug, Clone, PartialEq)]
pub struct FedInput {
    pub name: String,
    pub dtype: DataType,
    pub dims: Vec<i64>,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct FakeEngine {
    pub reject_config: AtomicBool,
    pub fail_session_create: AtomicBool,
    pub fail_runs: AtomicBool,
    /// `new_status` returns null.
    pub fail_status_alloc: AtomicBool,
    /// Milliseconds each `import_graph_def` sleeps before parsing.
    pub import_delay_ms: AtomicU64,
    statuses: AtomicUsize,
    graphs: AtomicUsize,
    options: AtomicUsize,
    sessions: AtomicUsize,
    tensors: AtomicUsize,
    runs: AtomicUsize,
    released_inputs: AtomicUsize,
    events: Mutex<Vec<&'static str>>,
    configs: Mutex<Vec<Vec<u8>>>,
    fed: Mutex<Vec<FedInput>>,
    close_threads: Mutex<Vec<ThreadId>>,
}

/// A fresh fake engine plus the trait object handed to the runtime.
pub fn fake_engine() -> (Arc<FakeEngine>, EngineRef) {
    init_logging(&LoggingConfig::testing());
    let fake = Arc::new(FakeEngine::default());
    let engine: EngineRef = fake.clone();
    (fake, engine)
}

impl FakeEngine {
    pub fn live(&self) -> LiveHandles {
        LiveHandles {
            statuses: self.statuses.load(Ordering::SeqCst),
            graphs: self.graphs.load(Ordering::SeqCst),
            options: self.options.load(Ordering::SeqCst),
            sessions: self.sessions.load(Ordering::SeqCst),
            tensors: self.tensors.load(Ordering::SeqCst),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Input tensors whose deallocator has been called.
    pub fn released_inputs(&self) -> usize {
        self.released_inputs.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    /// Config payloads passed to `set_config`, in call order.
    pub fn configs(&self) -> Vec<Vec<u8>> {
        self.configs.lock().unwrap().clone()
    }

    pub fn fed(&self) -> Vec<FedInput> {
        self.fed.lock().unwrap().clone()
    }

    /// Threads `close_session` was called on.
    pub fn close_threads(&self) -> Vec<ThreadId> {
        self.close_threads.lock().unwrap().clone()
    }

    fn event(&self, name: &'static str) {
        self.events.lock().unwrap().push(name);
    }

    fn alloc_owned(&self, value: Value) -> *mut RawTensor {
        self.tensors.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(FakeTensor {
            dtype: value.dtype,
            dims: value.dims,
            data: TensorData::Owned(value.bytes),
        }))
        .cast()
    }
}

/// Write `contents` to `model.pb` in a fresh temp dir.
pub fn write_model(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.pb");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

/// `{ dim, data }` request entry.
pub fn shaped(dims: &[i64], data: TypedArray) -> HostValue {
    let dim = HostValue::Array(dims.iter().map(|&d| HostValue::Number(d as f64)).collect());
    HostObject::new().with("dim", dim).with("data", data).into()
}

/// `{ input: { dim: [1, 28, 28, 1], data: Float32Array(784 zeros) } }`.
pub fn mnist_request() -> HostValue {
    HostObject::new()
        .with("input", shaped(&[1, 28, 28, 1], TypedArray::from_f32(&[0.0; 784])))
        .into()
}

struct FakeStatus {
    code: Code,
    message: String,
}

enum OpKind {
    Placeholder,
    Sum { src: String, count: usize },
    Identity { src: String },
}

struct FakeOp {
    name: String,
    kind: OpKind,
}

#[derive(Default)]
struct FakeGraph {
    ops: Vec<Box<FakeOp>>,
}

impl FakeGraph {
    fn find(&self, name: &str) -> Option<&FakeOp> {
        self.ops.iter().map(|op| &**op).find(|op| op.name == name)
    }
}

struct FakeSessionOptions {
    config: Option<Vec<u8>>,
}

struct FakeSession {
    graph: *const FakeGraph,
    closed: bool,
}

enum TensorData {
    Borrowed {
        ptr: *mut c_void,
        len: usize,
        deallocator: Deallocator,
        arg: *mut c_void,
    },
    Owned(Vec<u8>),
}

struct FakeTensor {
    dtype: DataType,
    dims: Vec<i64>,
    data: TensorData,
}

impl FakeTensor {
    unsafe fn bytes(&self) -> &[u8] {
        match &self.data {
            TensorData::Borrowed { ptr, len, .. } if *len > 0 => {
                std::slice::from_raw_parts(ptr.cast::<u8>(), *len)
            }
            TensorData::Borrowed { .. } => &[],
            TensorData::Owned(bytes) => bytes,
        }
    }
}

#[derive(Clone)]
struct Value {
    dtype: DataType,
    dims: Vec<i64>,
    bytes: Vec<u8>,
}

fn parse_graph(bytes: &[u8]) -> Result<Vec<Box<FakeOp>>, String> {
    let text = std::str::from_utf8(bytes).map_err(|_| "Invalid GraphDef: not text".to_string())?;
    let mut ops = Vec::new();
    for line in text
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
    {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let kind = match parts.as_slice() {
            ["placeholder", _] => OpKind::Placeholder,
            ["sum", _, src, count] => OpKind::Sum {
                src: src.to_string(),
                count: count
                    .parse()
                    .map_err(|_| format!("Invalid GraphDef: bad count in '{}'", line))?,
            },
            ["identity", _, src] => OpKind::Identity {
                src: src.to_string(),
            },
            _ => return Err(format!("Invalid GraphDef: cannot parse '{}'", line)),
        };
        ops.push(Box::new(FakeOp {
            name: parts[1].to_string(),
            kind,
        }));
    }
    if ops.is_empty() {
        return Err("Invalid GraphDef: no nodes".into());
    }
    Ok(ops)
}

fn eval(graph: &FakeGraph, name: &str, feeds: &HashMap<String, Value>) -> Result<Value, String> {
    let op = graph
        .find(name)
        .ok_or_else(|| format!("node '{}' not found", name))?;
    match &op.kind {
        OpKind::Placeholder => feeds
            .get(name)
            .cloned()
            .ok_or_else(|| format!("You must feed a value for placeholder tensor '{}'", name)),
        OpKind::Identity { src } => eval(graph, src, feeds),
        OpKind::Sum { src, count } => {
            let value = eval(graph, src, feeds)?;
            let total: f32 = match value.dtype {
                DataType::Float => value
                    .bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .sum(),
                DataType::UInt8 | DataType::Bool => value.bytes.iter().map(|&b| b as f32).sum(),
            };
            let bytes = (0..*count)
                .flat_map(|i| (total + i as f32).to_ne_bytes())
                .collect();
            Ok(Value {
                dtype: DataType::Float,
                dims: vec![1, *count as i64],
                bytes,
            })
        }
    }
}

unsafe fn set_status(status: *mut RawStatus, code: Code, message: &str) {
    let status = &mut *status.cast::<FakeStatus>();
    status.code = code;
    status.message = message.to_string();
}

unsafe fn clear_status(status: *mut RawStatus) {
    set_status(status, Code::Ok, "");
}

// SAFETY: handles are boxes owned by the caller until the matching delete.
unsafe impl Engine for FakeEngine {
    fn name(&self) -> String {
        "fake".to_string()
    }

    fn new_status(&self) -> *mut RawStatus {
        if self.fail_status_alloc.load(Ordering::SeqCst) {
            return std::ptr::null_mut();
        }
        self.statuses.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(FakeStatus {
            code: Code::Ok,
            message: String::new(),
        }))
        .cast()
    }

    unsafe fn delete_status(&self, status: *mut RawStatus) {
        drop(Box::from_raw(status.cast::<FakeStatus>()));
        self.statuses.fetch_sub(1, Ordering::SeqCst);
        self.event("delete_status");
    }

    unsafe fn status_code(&self, status: *const RawStatus) -> Code {
        (*status.cast::<FakeStatus>()).code
    }

    unsafe fn status_message(&self, status: *const RawStatus) -> String {
        (*status.cast::<FakeStatus>()).message.clone()
    }

    fn new_graph(&self) -> *mut RawGraph {
        self.graphs.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(FakeGraph::default())).cast()
    }

    unsafe fn delete_graph(&self, graph: *mut RawGraph) {
        drop(Box::from_raw(graph.cast::<FakeGraph>()));
        self.graphs.fetch_sub(1, Ordering::SeqCst);
        self.event("delete_graph");
    }

    unsafe fn import_graph_def(
        &self,
        graph: *mut RawGraph,
        graph_def: &[u8],
        prefix: &CStr,
        status: *mut RawStatus,
    ) {
        assert!(prefix.to_bytes().is_empty(), "imports use an empty prefix");
        let delay = self.import_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        match parse_graph(graph_def) {
            Ok(ops) => {
                (*graph.cast::<FakeGraph>()).ops = ops;
                clear_status(status);
            }
            Err(msg) => set_status(status, Code::InvalidArgument, &msg),
        }
    }

    unsafe fn operation_by_name(&self, graph: *mut RawGraph, name: &CStr) -> *mut RawOperation {
        let graph = &*graph.cast::<FakeGraph>();
        match name.to_str().ok().and_then(|name| graph.find(name)) {
            Some(op) => (op as *const FakeOp).cast_mut().cast(),
            None => std::ptr::null_mut(),
        }
    }

    fn new_session_options(&self) -> *mut RawSessionOptions {
        self.options.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(FakeSessionOptions { config: None })).cast()
    }

    unsafe fn delete_session_options(&self, options: *mut RawSessionOptions) {
        drop(Box::from_raw(options.cast::<FakeSessionOptions>()));
        self.options.fetch_sub(1, Ordering::SeqCst);
    }

    unsafe fn set_config(
        &self,
        options: *mut RawSessionOptions,
        proto: &[u8],
        status: *mut RawStatus,
    ) {
        self.configs.lock().unwrap().push(proto.to_vec());
        if self.reject_config.load(Ordering::SeqCst) {
            set_status(status, Code::InvalidArgument, "Unparseable ConfigProto");
            return;
        }
        (*options.cast::<FakeSessionOptions>()).config = Some(proto.to_vec());
        clear_status(status);
    }

    unsafe fn new_session(
        &self,
        graph: *mut RawGraph,
        _options: *const RawSessionOptions,
        status: *mut RawStatus,
    ) -> *mut RawSession {
        if self.fail_session_create.load(Ordering::SeqCst) {
            set_status(status, Code::Internal, "no devices available");
            return std::ptr::null_mut();
        }
        self.sessions.fetch_add(1, Ordering::SeqCst);
        clear_status(status);
        Box::into_raw(Box::new(FakeSession {
            graph: graph.cast::<FakeGraph>(),
            closed: false,
        }))
        .cast()
    }

    unsafe fn close_session(&self, session: *mut RawSession, status: *mut RawStatus) {
        (*session.cast::<FakeSession>()).closed = true;
        self.close_threads.lock().unwrap().push(thread::current().id());
        self.event("close_session");
        clear_status(status);
    }

    unsafe fn delete_session(&self, session: *mut RawSession, status: *mut RawStatus) {
        drop(Box::from_raw(session.cast::<FakeSession>()));
        self.sessions.fetch_sub(1, Ordering::SeqCst);
        self.event("delete_session");
        clear_status(status);
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
        self.runs.fetch_add(1, Ordering::SeqCst);
        let session = &*session.cast::<FakeSession>();
        assert!(!session.closed, "run on a closed session");
        let graph = &*session.graph;

        let mut feeds = HashMap::new();
        for (input, &tensor) in inputs.iter().zip(input_values) {
            let op = &*input.oper.cast::<FakeOp>();
            let tensor = &*tensor.cast::<FakeTensor>();
            let value = Value {
                dtype: tensor.dtype,
                dims: tensor.dims.clone(),
                bytes: tensor.bytes().to_vec(),
            };
            self.fed.lock().unwrap().push(FedInput {
                name: op.name.clone(),
                dtype: value.dtype,
                dims: value.dims.clone(),
                bytes: value.bytes.clone(),
            });
            feeds.insert(op.name.clone(), value);
        }

        if self.fail_runs.load(Ordering::SeqCst) {
            // Hand back a tensor anyway; the caller still owns it.
            if let Some(slot) = output_values.first_mut() {
                *slot = self.alloc_owned(Value {
                    dtype: DataType::Float,
                    dims: vec![1],
                    bytes: vec![0; 4],
                });
            }
            set_status(status, Code::Internal, "injected run failure");
            return;
        }

        let mut produced = Vec::with_capacity(outputs.len());
        for output in outputs {
            let op = &*output.oper.cast::<FakeOp>();
            match eval(graph, &op.name, &feeds) {
                Ok(value) => produced.push(value),
                Err(msg) => {
                    set_status(status, Code::InvalidArgument, &msg);
                    return;
                }
            }
        }
        for (slot, value) in output_values.iter_mut().zip(produced) {
            *slot = self.alloc_owned(value);
        }
        clear_status(status);
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
        self.tensors.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new(FakeTensor {
            dtype,
            dims: dims.to_vec(),
            data: TensorData::Borrowed {
                ptr: data,
                len,
                deallocator,
                arg: deallocator_arg,
            },
        }))
        .cast()
    }

    unsafe fn delete_tensor(&self, tensor: *mut RawTensor) {
        let tensor = Box::from_raw(tensor.cast::<FakeTensor>());
        if let TensorData::Borrowed {
            ptr,
            len,
            deallocator,
            arg,
        } = tensor.data
        {
            deallocator(ptr, len, arg);
            self.released_inputs.fetch_add(1, Ordering::SeqCst);
        }
        self.tensors.fetch_sub(1, Ordering::SeqCst);
    }

    unsafe fn num_dims(&self, tensor: *const RawTensor) -> c_int {
        (*tensor.cast::<FakeTensor>()).dims.len() as c_int
    }

    unsafe fn dim(&self, tensor: *const RawTensor, index: c_int) -> i64 {
        (&(*tensor.cast::<FakeTensor>()).dims)[index as usize]
    }

    unsafe fn tensor_byte_size(&self, tensor: *const RawTensor) -> usize {
        (*tensor.cast::<FakeTensor>()).bytes().len()
    }

    unsafe fn tensor_data(&self, tensor: *const RawTensor) -> *mut c_void {
        match &(*tensor.cast::<FakeTensor>()).data {
            TensorData::Borrowed { ptr, .. } => *ptr,
            TensorData::Owned(bytes) => bytes.as_ptr().cast_mut().cast(),
        }
    }
}
