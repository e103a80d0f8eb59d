//! Session lifecycle: loading a graph into a runnable session and tracking
//! which session, if any, a model currently serves.
//!
//! A [`SessionSlot`] moves through
//! `Unloaded -> Loading -> Loaded | Failed`, may be reloaded from any of
//! those, and ends in `Closed`. Loaded sessions are handed out as
//! `Arc<LoadedSession>`, so replacing or closing the slot never frees a
//! session that an in-flight request still runs against.

use crate::handle::{EngineRef, EngineSession, Graph, SessionOptions, Status};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tfmodel_core::{Error, ModelOptions, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique identifier of a loaded session.
pub type SessionId = Uuid;

/// Observable state of a [`SessionSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing loaded yet.
    Unloaded,
    /// A load is in progress.
    Loading,
    /// A session is ready to execute.
    Loaded,
    /// The most recent load failed.
    Failed,
    /// The slot was closed; no further loads are accepted.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unloaded => "unloaded",
            SessionState::Loading => "loading",
            SessionState::Loaded => "loaded",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Run statistics of one loaded session.
#[derive(Debug, Clone)]
pub struct SessionStatistics {
    /// Engine runs that succeeded.
    pub total_runs: u64,
    /// Engine runs that returned an error.
    pub failed_runs: u64,
    /// Time spent in successful runs.
    pub total_run_time: Duration,
    /// Mean duration of successful runs.
    pub average_run_time: Duration,
    /// Shortest successful run.
    pub min_run_time: Option<Duration>,
    /// Longest successful run.
    pub max_run_time: Option<Duration>,
    /// When the session finished loading.
    pub created_at: Instant,
    /// When the last run finished.
    pub last_run_at: Option<Instant>,
}

impl Default for SessionStatistics {
    fn default() -> Self {
        Self {
            total_runs: 0,
            failed_runs: 0,
            total_run_time: Duration::ZERO,
            average_run_time: Duration::ZERO,
            min_run_time: None,
            max_run_time: None,
            created_at: Instant::now(),
            last_run_at: None,
        }
    }
}

impl SessionStatistics {
    fn record(&mut self, elapsed: Duration, success: bool) {
        if success {
            self.total_runs += 1;
            self.total_run_time += elapsed;
            self.average_run_time = self.total_run_time.div_f64(self.total_runs as f64);
            self.min_run_time = Some(self.min_run_time.map_or(elapsed, |min| min.min(elapsed)));
            self.max_run_time = Some(self.max_run_time.map_or(elapsed, |max| max.max(elapsed)));
        } else {
            self.failed_runs += 1;
        }
        self.last_run_at = Some(Instant::now());
    }
}

/// A graph imported into a ready-to-run engine session.
pub struct LoadedSession {
    id: SessionId,
    path: PathBuf,
    session: EngineSession,
    run_gate: Mutex<()>,
    statistics: Mutex<SessionStatistics>,
}

impl LoadedSession {
    /// Read the model file at `path`, import it and create a session
    /// configured from `options`.
    ///
    /// Every handle allocated before a failing step is released before the
    /// error is returned.
    pub fn load(engine: &EngineRef, path: &Path, options: &ModelOptions) -> Result<Self> {
        let graph_def = std::fs::read(path).map_err(|source| Error::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = graph_def.len(), "read model file");

        let status = Status::new(engine)?;
        let graph = Graph::new(engine, graph_def)?;
        graph.import(&status)?;

        let mut session_options = SessionOptions::new(engine)?;
        let config = options.session_config();
        if let Some(proto) = config.encode() {
            debug!(?config, "applying session config");
            session_options.set_config(&proto, &status)?;
        }

        let session = EngineSession::new(graph, &session_options, &status)?;
        let id = Uuid::new_v4();
        info!(session = %id, path = %path.display(), engine = %engine.name(), "model loaded");

        Ok(Self {
            id,
            path: path.to_path_buf(),
            session,
            run_gate: Mutex::new(()),
            statistics: Mutex::new(SessionStatistics::default()),
        })
    }

    /// Identifier assigned at load time.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Model file this session was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the run statistics.
    pub fn statistics(&self) -> SessionStatistics {
        self.statistics.lock().clone()
    }

    pub(crate) fn engine_session(&self) -> &EngineSession {
        &self.session
    }

    /// Held for the duration of one engine run.
    pub(crate) fn lock_runs(&self) -> MutexGuard<'_, ()> {
        self.run_gate.lock()
    }

    pub(crate) fn record_run(&self, elapsed: Duration, success: bool) {
        self.statistics.lock().record(elapsed, success);
    }
}

impl fmt::Debug for LoadedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedSession")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("graph_def_len", &self.session.graph().graph_def_len())
            .finish()
    }
}

impl Drop for LoadedSession {
    fn drop(&mut self) {
        debug!(session = %self.id, "releasing session");
    }
}

/// Proof that a load was started; passed back to [`SessionSlot::finish_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

enum Slot {
    Unloaded,
    Loading,
    Loaded(Arc<LoadedSession>),
    Failed,
    Closed,
}

impl Slot {
    fn state(&self) -> SessionState {
        match self {
            Slot::Unloaded => SessionState::Unloaded,
            Slot::Loading => SessionState::Loading,
            Slot::Loaded(_) => SessionState::Loaded,
            Slot::Failed => SessionState::Failed,
            Slot::Closed => SessionState::Closed,
        }
    }
}

struct SlotInner {
    slot: Slot,
    generation: u64,
}

/// The session a model currently serves, if any.
pub struct SessionSlot {
    inner: RwLock<SlotInner>,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SlotInner {
                slot: Slot::Unloaded,
                generation: 0,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.read().slot.state()
    }

    /// The loaded session, or `InvalidState` if there is none.
    pub fn current(&self) -> Result<Arc<LoadedSession>> {
        match &self.inner.read().slot {
            Slot::Loaded(session) => Ok(Arc::clone(session)),
            other => Err(Error::InvalidState(format!(
                "no model loaded (session is {})",
                other.state()
            ))),
        }
    }

    /// Enter `Loading`.
    ///
    /// The previously loaded session, if any, leaves the slot and is handed
    /// back so the caller can release it away from its own thread.
    pub fn begin_load(&self) -> Result<(LoadTicket, Option<Arc<LoadedSession>>)> {
        let mut inner = self.inner.write();
        if matches!(inner.slot, Slot::Closed) {
            return Err(Error::InvalidState("model is closed".into()));
        }
        inner.generation += 1;
        let ticket = LoadTicket(inner.generation);
        match std::mem::replace(&mut inner.slot, Slot::Loading) {
            Slot::Loaded(session) => {
                debug!(session = %session.id(), "replacing loaded session");
                Ok((ticket, Some(session)))
            }
            _ => Ok((ticket, None)),
        }
    }

    /// Commit the outcome of the load identified by `ticket`.
    ///
    /// A load that was superseded by a later `begin_load`, or that finished
    /// after the slot was closed, is discarded and reported as
    /// `InvalidState`.
    pub fn finish_load(&self, ticket: LoadTicket, outcome: Result<LoadedSession>) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.generation != ticket.0 || !matches!(inner.slot, Slot::Loading) {
            drop(inner);
            return match outcome {
                Ok(session) => {
                    warn!(session = %session.id(), "discarding session from a superseded load");
                    Err(Error::InvalidState(
                        "load was superseded before it completed".into(),
                    ))
                }
                Err(err) => Err(err),
            };
        }

        match outcome {
            Ok(session) => {
                inner.slot = Slot::Loaded(Arc::new(session));
                Ok(())
            }
            Err(err) => {
                inner.slot = Slot::Failed;
                drop(inner);
                warn!(error = %err, "model load failed");
                Err(err)
            }
        }
    }

    /// Close the slot. Returns the session that was loaded, if any.
    pub fn close(&self) -> Option<Arc<LoadedSession>> {
        let previous = std::mem::replace(&mut self.inner.write().slot, Slot::Closed);
        match previous {
            Slot::Loaded(session) => Some(session),
            _ => None,
        }
    }
}

impl fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSlot")
            .field("state", &self.state())
            .finish()
    }
}
