//! Execution bridge: blocking engine work on background threads, results
//! delivered back to whoever awaits the returned [`Pending`].
//!
//! `submit` starts the work immediately on the runtime's blocking pool.
//! The completion callback is not sent to the worker; it runs inside
//! [`Pending::poll`], i.e. on the task that awaits the result, and only
//! ever sees the plain value the work returned. A failing work skips the
//! completion, and a panicking work becomes [`Error::Worker`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tfmodel_core::{Error, Result};
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::{debug, info_span};

type BoxedResult<O> = Pin<Box<dyn Future<Output = Result<O>> + Send>>;

/// Submits blocking work to a tokio runtime.
#[derive(Debug, Clone)]
pub struct ExecutionBridge {
    runtime: Handle,
}

impl ExecutionBridge {
    /// Bridge onto the runtime behind `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Bridge onto the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::InvalidState(format!("no tokio runtime available: {}", e)))
    }

    /// The runtime work is submitted to.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Run `work` on a background thread and `completion` on its result.
    ///
    /// `operation` names the submission in logs and error messages.
    pub fn submit<T, O, W, C>(&self, operation: &'static str, work: W, completion: C) -> Pending<O>
    where
        T: Send + 'static,
        O: Send + 'static,
        W: FnOnce() -> Result<T> + Send + 'static,
        C: FnOnce(T) -> O + Send + 'static,
    {
        let span = info_span!("bridge", operation);
        let task = self.runtime.spawn_blocking(move || {
            let _entered = span.entered();
            work()
        });

        Pending::running(Box::pin(async move {
            let value = task
                .await
                .map_err(|e| worker_error(operation, e))??;
            debug!(operation, "work finished, running completion");
            Ok(completion(value))
        }))
    }
}

fn worker_error(operation: &str, err: JoinError) -> Error {
    if err.is_panic() {
        let payload = err.into_panic();
        Error::Worker(format!("{} panicked: {}", operation, panic_message(&*payload)))
    } else {
        Error::Worker(format!("{} was cancelled", operation))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}

/// The eventual result of one submission.
///
/// Resolves exactly once. Dropping it does not cancel the work; whatever the
/// work allocated is still released when it finishes.
#[must_use = "futures do nothing unless polled"]
pub struct Pending<O> {
    state: PendingState<O>,
}

enum PendingState<O> {
    Rejected(Error),
    Running(BoxedResult<O>),
    Done,
}

impl<O> Pending<O> {
    /// A submission that failed before any work was dispatched.
    pub fn rejected(err: Error) -> Self {
        Self {
            state: PendingState::Rejected(err),
        }
    }

    fn running(future: BoxedResult<O>) -> Self {
        Self {
            state: PendingState::Running(future),
        }
    }

    /// Whether this was rejected without dispatching any work.
    pub fn is_rejected(&self) -> bool {
        matches!(self.state, PendingState::Rejected(_))
    }
}

impl<O> Future for Pending<O> {
    type Output = Result<O>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.state, PendingState::Done) {
            PendingState::Rejected(err) => Poll::Ready(Err(err)),
            PendingState::Running(mut future) => match future.as_mut().poll(cx) {
                Poll::Ready(result) => Poll::Ready(result),
                Poll::Pending => {
                    this.state = PendingState::Running(future);
                    Poll::Pending
                }
            },
            PendingState::Done => panic!("`Pending` polled after completion"),
        }
    }
}

impl<O> fmt::Debug for Pending<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PendingState::Rejected(_) => "rejected",
            PendingState::Running(_) => "running",
            PendingState::Done => "done",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}
