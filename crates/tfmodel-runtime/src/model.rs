//! The model handle exposed to host environments.

use crate::bridge::{ExecutionBridge, Pending};
use crate::context::RequestContext;
use crate::handle::EngineRef;
use crate::session::{LoadedSession, SessionId, SessionSlot, SessionState, SessionStatistics};
use std::path::Path;
use std::sync::Arc;
use tfmodel_core::{decode_output_names, encode_outputs, HostValue, ModelOptions, Result};
use tracing::{debug, info};

/// A graph model that loads and executes without blocking its caller.
///
/// `load` and `execute` return a [`Pending`] immediately; file reading,
/// graph import and engine runs happen on the runtime's blocking pool.
/// Clones share the same loaded session.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tfmodel_core::{HostObject, HostValue, ModelOptions, TypedArray};
/// use tfmodel_runtime::{Engine, TfModel};
///
/// # async fn example(engine: Arc<dyn Engine>) -> tfmodel_core::Result<()> {
/// let model = TfModel::new(engine, ModelOptions::new().with_allow_growth(true))?;
/// model.load("mnist.pb").await?;
///
/// let dim = HostValue::Array([1.0, 28.0, 28.0, 1.0].map(HostValue::Number).to_vec());
/// let input = HostObject::new()
///     .with("dim", dim)
///     .with("data", TypedArray::from_f32(&[0.0; 784]));
/// let inputs: HostValue = HostObject::new().with("input", input).into();
///
/// let outputs = model.execute(&inputs, &["output"]).await?;
/// assert!(outputs.as_object().unwrap().contains_key("output"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TfModel {
    engine: EngineRef,
    options: ModelOptions,
    slot: Arc<SessionSlot>,
    bridge: ExecutionBridge,
}

impl TfModel {
    /// Create a model on the current tokio runtime.
    pub fn new(engine: EngineRef, options: ModelOptions) -> Result<Self> {
        Ok(Self::with_bridge(engine, options, ExecutionBridge::current()?))
    }

    /// Create a model that submits its work through `bridge`.
    pub fn with_bridge(engine: EngineRef, options: ModelOptions, bridge: ExecutionBridge) -> Self {
        debug!(engine = %engine.name(), ?options, "model created");
        Self {
            engine,
            options,
            slot: Arc::new(SessionSlot::new()),
            bridge,
        }
    }

    /// Create a model from a host options value.
    ///
    /// Anything other than an object yields default options.
    pub fn construct(engine: EngineRef, options: &HostValue) -> Result<Self> {
        Self::new(engine, ModelOptions::from_host_value(options)?)
    }

    /// Create a model backed by the linked TensorFlow library.
    #[cfg(feature = "tensorflow")]
    pub fn tensorflow(options: ModelOptions) -> Result<Self> {
        Self::new(Arc::new(crate::engine::tensorflow::TensorFlow), options)
    }

    /// Options this model was created with.
    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.slot.state()
    }

    /// Identifier of the loaded session, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.slot.current().ok().map(|session| session.id())
    }

    /// Run statistics of the loaded session, if any.
    pub fn statistics(&self) -> Option<SessionStatistics> {
        self.slot.current().ok().map(|session| session.statistics())
    }

    /// Load the serialized graph at `path`, replacing any loaded session.
    ///
    /// Fails with `FileNotFound`, `GraphImport`, `Config` or `SessionCreate`.
    pub fn load(&self, path: impl AsRef<Path>) -> Pending<()> {
        let path = path.as_ref().to_path_buf();
        let (ticket, previous) = match self.slot.begin_load() {
            Ok(started) => started,
            Err(err) => return Pending::rejected(err),
        };
        info!(path = %path.display(), "loading model");

        let engine = Arc::clone(&self.engine);
        let options = self.options;
        let slot = Arc::clone(&self.slot);
        self.bridge.submit(
            "load",
            move || {
                drop(previous);
                let outcome = LoadedSession::load(&engine, &path, &options);
                slot.finish_load(ticket, outcome)
            },
            |()| (),
        )
    }

    /// Run the loaded graph.
    ///
    /// Resolves with `{ name: { dim, data } }` holding exactly the requested
    /// outputs in request order. Malformed inputs, or a call before a
    /// successful load, reject without dispatching any work.
    pub fn execute<S: AsRef<str>>(&self, inputs: &HostValue, output_names: &[S]) -> Pending<HostValue> {
        let session = match self.slot.current() {
            Ok(session) => session,
            Err(err) => return Pending::rejected(err),
        };
        let context = match RequestContext::decode(inputs, output_names) {
            Ok(context) => context,
            Err(err) => return Pending::rejected(err),
        };
        debug!(
            session = %session.id(),
            inputs = context.inputs().len(),
            outputs = context.output_names().len(),
            "dispatching request"
        );

        self.bridge
            .submit("execute", move || context.run(&session), encode_outputs)
    }

    /// [`TfModel::execute`] with the output names given as a host array.
    pub fn execute_value(&self, inputs: &HostValue, output_names: &HostValue) -> Pending<HostValue> {
        match decode_output_names(output_names) {
            Ok(names) => self.execute(inputs, &names),
            Err(err) => Pending::rejected(err),
        }
    }

    /// Release the loaded session on a background thread.
    ///
    /// Later `load` and `execute` calls are rejected. Requests already
    /// running keep the session alive until they finish.
    pub fn close(&self) -> Pending<()> {
        let released = self.slot.close();
        if let Some(session) = &released {
            info!(session = %session.id(), "model closed");
        }
        self.bridge.submit(
            "close",
            move || {
                drop(released);
                Ok(())
            },
            |()| (),
        )
    }
}

impl std::fmt::Debug for TfModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfModel")
            .field("options", &self.options)
            .field("slot", &self.slot)
            .finish()
    }
}
