//! Owning wrappers around engine handles.
//!
//! Each wrapper acquires its handle on construction and releases it in
//! `Drop`, so every exit path, including errors and panics, frees exactly
//! what was allocated. [`EngineSession`] additionally fixes the teardown
//! order: close session, delete session, delete graph, delete status.

use crate::engine::{
    noop_deallocator, DataType, Engine, RawGraph, RawOperation, RawOutput, RawSession,
    RawSessionOptions, RawStatus, RawTensor,
};
use std::ffi::CString;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::Arc;
use tfmodel_core::{Error, NamedTensor, OutputTensor, Result};
use tracing::warn;

/// Shared reference to the engine implementation.
pub type EngineRef = Arc<dyn Engine>;

/// `TF_Status`.
pub struct Status {
    raw: NonNull<RawStatus>,
    engine: EngineRef,
}

impl Status {
    /// Allocate a status object.
    pub fn new(engine: &EngineRef) -> Result<Self> {
        let raw = NonNull::new(engine.new_status())
            .ok_or_else(|| Error::InvalidState("engine failed to allocate a status".into()))?;
        Ok(Self {
            raw,
            engine: Arc::clone(engine),
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut RawStatus {
        self.raw.as_ptr()
    }

    /// Whether the last call reported success.
    pub fn is_ok(&self) -> bool {
        // SAFETY: `raw` is live until drop.
        unsafe { self.engine.status_code(self.raw.as_ptr()) }.is_ok()
    }

    /// The engine's message for the last call.
    pub fn message(&self) -> String {
        // SAFETY: `raw` is live until drop.
        unsafe { self.engine.status_message(self.raw.as_ptr()) }
    }

    /// `Ok` if the last call succeeded, otherwise the error built from the
    /// engine's message.
    pub fn check(&self, err: impl FnOnce(String) -> Error) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(err(self.message()))
        }
    }
}

impl Drop for Status {
    fn drop(&mut self) {
        // SAFETY: allocated by this engine, deleted once.
        unsafe { self.engine.delete_status(self.raw.as_ptr()) }
    }
}

/// `TF_Graph` together with the serialized bytes it was imported from.
///
/// The engine may keep pointing into the bytes, so they are released only
/// after the graph handle.
pub struct Graph {
    raw: NonNull<RawGraph>,
    engine: EngineRef,
    graph_def: Box<[u8]>,
}

impl Graph {
    /// Create an empty graph that will own `graph_def`.
    pub fn new(engine: &EngineRef, graph_def: Vec<u8>) -> Result<Self> {
        let raw = NonNull::new(engine.new_graph())
            .ok_or_else(|| Error::GraphImport("engine failed to allocate a graph".into()))?;
        Ok(Self {
            raw,
            engine: Arc::clone(engine),
            graph_def: graph_def.into_boxed_slice(),
        })
    }

    /// Import the owned serialized graph with an empty name prefix.
    pub fn import(&self, status: &Status) -> Result<()> {
        // SAFETY: graph, bytes and status are live; the bytes outlive the graph.
        unsafe {
            self.engine
                .import_graph_def(self.raw.as_ptr(), &self.graph_def, c"", status.as_ptr());
        }
        status.check(Error::GraphImport)
    }

    /// Look up an operation; `None` if the graph has no operation of that name.
    pub fn operation(&self, name: &str) -> Option<NonNull<RawOperation>> {
        let name = CString::new(name).ok()?;
        // SAFETY: graph is live; operations are owned by the graph.
        NonNull::new(unsafe { self.engine.operation_by_name(self.raw.as_ptr(), &name) })
    }

    /// First output of the named operation, as the engine addresses it.
    pub fn output(&self, name: &str) -> Result<RawOutput> {
        let oper = self.operation(name).ok_or_else(|| {
            Error::EngineRun(format!("operation '{}' not found in graph", name))
        })?;
        Ok(RawOutput {
            oper: oper.as_ptr(),
            index: 0,
        })
    }

    /// Size of the serialized graph in bytes.
    pub fn graph_def_len(&self) -> usize {
        self.graph_def.len()
    }

    fn as_ptr(&self) -> *mut RawGraph {
        self.raw.as_ptr()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        // SAFETY: allocated by this engine, deleted once. `graph_def` is
        // dropped after this body returns.
        unsafe { self.engine.delete_graph(self.raw.as_ptr()) }
    }
}

/// `TF_SessionOptions`.
pub struct SessionOptions {
    raw: NonNull<RawSessionOptions>,
    engine: EngineRef,
}

impl SessionOptions {
    /// Allocate options with engine defaults.
    pub fn new(engine: &EngineRef) -> Result<Self> {
        let raw = NonNull::new(engine.new_session_options()).ok_or_else(|| {
            Error::Config("engine failed to allocate session options".into())
        })?;
        Ok(Self {
            raw,
            engine: Arc::clone(engine),
        })
    }

    /// Apply a serialized configuration payload.
    pub fn set_config(&mut self, proto: &[u8], status: &Status) -> Result<()> {
        // SAFETY: options and status are live.
        unsafe {
            self.engine
                .set_config(self.raw.as_ptr(), proto, status.as_ptr());
        }
        status.check(Error::Config)
    }
}

impl Drop for SessionOptions {
    fn drop(&mut self) {
        // SAFETY: allocated by this engine, deleted once.
        unsafe { self.engine.delete_session_options(self.raw.as_ptr()) }
    }
}

/// A session bound to the graph it owns.
pub struct EngineSession {
    raw: NonNull<RawSession>,
    graph: ManuallyDrop<Graph>,
    engine: EngineRef,
}

// SAFETY: the engine's session and graph handles may be used from any
// thread; runs against one session are serialized by its owner.
unsafe impl Send for EngineSession {}
unsafe impl Sync for EngineSession {}

impl EngineSession {
    /// Create a session for `graph`. On failure the graph is released.
    pub fn new(graph: Graph, options: &SessionOptions, status: &Status) -> Result<Self> {
        let engine = Arc::clone(&graph.engine);
        // SAFETY: graph, options and status are live.
        let raw = unsafe {
            engine.new_session(graph.as_ptr(), options.raw.as_ptr(), status.as_ptr())
        };

        if let Err(err) = status.check(Error::SessionCreate) {
            if let Some(raw) = NonNull::new(raw) {
                Self::close_and_delete(&engine, raw, status);
            }
            return Err(err);
        }

        let raw = NonNull::new(raw)
            .ok_or_else(|| Error::SessionCreate("engine returned no session".into()))?;
        Ok(Self {
            raw,
            graph: ManuallyDrop::new(graph),
            engine,
        })
    }

    /// The graph this session runs.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The engine that owns this session.
    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    /// Run the session once.
    ///
    /// Returns one owned tensor per requested output, in order. Output slots
    /// filled by the engine are wrapped before the status is inspected, so
    /// they are freed on the error path too.
    pub fn run(
        &self,
        inputs: &[RawOutput],
        input_values: &[NativeTensor<'_>],
        outputs: &[RawOutput],
    ) -> Result<Vec<NativeTensor<'static>>> {
        let status = Status::new(&self.engine)?;
        let input_ptrs: Vec<*mut RawTensor> = input_values.iter().map(|t| t.as_ptr()).collect();
        let mut output_ptrs: Vec<*mut RawTensor> = vec![std::ptr::null_mut(); outputs.len()];

        // SAFETY: every handle is live for the duration of the call and the
        // slices have matching lengths.
        unsafe {
            self.engine.session_run(
                self.raw.as_ptr(),
                inputs,
                &input_ptrs,
                outputs,
                &mut output_ptrs,
                status.as_ptr(),
            );
        }

        let produced: Vec<Option<NativeTensor<'static>>> = output_ptrs
            .into_iter()
            // SAFETY: non-null slots are new tensors owned by us.
            .map(|ptr| unsafe { NativeTensor::from_raw(&self.engine, ptr) })
            .collect();

        status.check(Error::EngineRun)?;

        produced
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                t.ok_or_else(|| Error::EngineRun(format!("engine returned no tensor for output #{}", i)))
            })
            .collect()
    }

    fn close_and_delete(engine: &EngineRef, raw: NonNull<RawSession>, status: &Status) {
        // SAFETY: the session is live and deleted once; `status` is live.
        unsafe {
            engine.close_session(raw.as_ptr(), status.as_ptr());
            if !status.is_ok() {
                warn!("closing session failed: {}", status.message());
            }
            engine.delete_session(raw.as_ptr(), status.as_ptr());
            if !status.is_ok() {
                warn!("deleting session failed: {}", status.message());
            }
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        match Status::new(&self.engine) {
            Ok(status) => {
                Self::close_and_delete(&self.engine, self.raw, &status);
                // SAFETY: dropped exactly once, after the session is gone.
                unsafe { ManuallyDrop::drop(&mut self.graph) };
                drop(status);
            }
            // The graph must outlive the session, so both are leaked.
            Err(err) => warn!("cannot close session, leaking it and its graph: {}", err),
        }
    }
}

/// `TF_Tensor`.
///
/// Tensors built from host data borrow it for `'a`; tensors produced by the
/// engine own their data and are `'static`.
pub struct NativeTensor<'a> {
    raw: NonNull<RawTensor>,
    engine: EngineRef,
    _data: PhantomData<&'a [u8]>,
}

impl<'a> NativeTensor<'a> {
    /// Wrap `input`'s bytes without copying.
    ///
    /// Booleans become zero-rank tensors; everything else keeps its shape.
    pub fn borrowed(engine: &EngineRef, input: &'a NamedTensor) -> Result<Self> {
        let buffer = input.buffer();
        let bytes = buffer.as_bytes();
        // SAFETY: `bytes` outlives the tensor (`'a`) and the engine never
        // writes through an input tensor. The no-op deallocator leaves
        // ownership with `input`.
        let raw = unsafe {
            engine.new_tensor(
                DataType::from(buffer.kind()),
                buffer.dims(),
                bytes.as_ptr().cast_mut().cast(),
                bytes.len(),
                noop_deallocator,
                std::ptr::null_mut(),
            )
        };
        let raw = NonNull::new(raw).ok_or_else(|| {
            Error::EngineRun(format!("engine failed to allocate tensor '{}'", input.name()))
        })?;
        Ok(Self {
            raw,
            engine: Arc::clone(engine),
            _data: PhantomData,
        })
    }
}

impl NativeTensor<'static> {
    /// Take ownership of an engine-allocated tensor; `None` for null.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live tensor from `engine` that nobody else frees.
    pub unsafe fn from_raw(engine: &EngineRef, raw: *mut RawTensor) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            engine: Arc::clone(engine),
            _data: PhantomData,
        })
    }
}

impl NativeTensor<'_> {
    fn as_ptr(&self) -> *mut RawTensor {
        self.raw.as_ptr()
    }

    /// Shape reported by the engine.
    pub fn dims(&self) -> Vec<i64> {
        // SAFETY: tensor is live.
        unsafe {
            let rank = self.engine.num_dims(self.raw.as_ptr());
            (0..rank.max(0))
                .map(|i| self.engine.dim(self.raw.as_ptr(), i))
                .collect()
        }
    }

    /// Tensor data as bytes.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: tensor is live for the borrow of `self`; the engine reports
        // the size of the buffer it returns.
        unsafe {
            let len = self.engine.tensor_byte_size(self.raw.as_ptr());
            let data = self.engine.tensor_data(self.raw.as_ptr());
            if data.is_null() || len == 0 {
                return &[];
            }
            std::slice::from_raw_parts(data.cast::<u8>(), len)
        }
    }

    /// Copy into a plain-data float output named `name`.
    pub fn to_output(&self, name: &str) -> OutputTensor {
        OutputTensor::from_native(name, self.dims(), self.bytes())
    }
}

impl Drop for NativeTensor<'_> {
    fn drop(&mut self) {
        // SAFETY: owned by this wrapper, deleted once.
        unsafe { self.engine.delete_tensor(self.raw.as_ptr()) }
    }
}
