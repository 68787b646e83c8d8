//! Analyzer results that become available after the analyzer has finished.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::AnalyzerResult;
use crate::error::{FlowError, Result};

/// Callbacks fired when an [`AnalyzerResultFuture`] resolves.
pub trait ResultListener: Send + Sync {
    fn on_success(&self, result: &Arc<dyn AnalyzerResult>);
    fn on_error(&self, error: &FlowError);
}

#[derive(Clone)]
enum FutureState {
    Pending,
    Ready(Arc<dyn AnalyzerResult>),
    Failed(FlowError),
}

struct Shared {
    state: Mutex<(FutureState, Vec<Box<dyn ResultListener>>)>,
    resolved: watch::Sender<bool>,
}

impl Shared {
    fn resolve(&self, outcome: Result<Arc<dyn AnalyzerResult>>) {
        let state = match outcome {
            Ok(result) => FutureState::Ready(result),
            Err(error) => FutureState::Failed(error),
        };
        let listeners = {
            let mut guard = self.state.lock();
            if !matches!(guard.0, FutureState::Pending) {
                warn!("Ignoring second resolution of analyzer result future");
                return;
            }
            guard.0 = state.clone();
            std::mem::take(&mut guard.1)
        };

        debug!(listeners = listeners.len(), "Analyzer result future resolved");
        for listener in &listeners {
            fire(listener.as_ref(), &state);
        }
        self.resolved.send_replace(true);
    }
}

fn fire(listener: &dyn ResultListener, state: &FutureState) {
    match state {
        FutureState::Ready(result) => listener.on_success(result),
        FutureState::Failed(error) => listener.on_error(error),
        FutureState::Pending => {}
    }
}

/// An analyzer result that may not be computed yet.
///
/// The future moves from pending to ready or failed exactly once. Listeners
/// added while pending fire in registration order at that moment; listeners
/// added afterwards fire immediately on the calling thread.
#[derive(Clone)]
pub struct AnalyzerResultFuture {
    shared: Arc<Shared>,
}

/// The completing side of an [`AnalyzerResultFuture`].
///
/// Dropping an unfulfilled promise fails the future, so waiters never hang.
pub struct ResultPromise {
    shared: Option<Arc<Shared>>,
}

impl AnalyzerResultFuture {
    /// Creates a pending future and the promise that resolves it.
    pub fn pending() -> (Self, ResultPromise) {
        let (resolved, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: Mutex::new((FutureState::Pending, Vec::new())),
            resolved,
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ResultPromise {
                shared: Some(shared),
            },
        )
    }

    /// A future that is already resolved.
    pub fn ready(result: Arc<dyn AnalyzerResult>) -> Self {
        let (future, promise) = Self::pending();
        promise.complete(Ok(result));
        future
    }

    /// Resolves the future with the output of an asynchronous task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = Result<Arc<dyn AnalyzerResult>>> + Send + 'static,
    {
        let (future, promise) = Self::pending();
        tokio::spawn(async move {
            promise.complete(task.await);
        });
        future
    }

    /// True once the result is available.
    pub fn is_ready(&self) -> bool {
        matches!(self.shared.state.lock().0, FutureState::Ready(_))
    }

    /// True once the future left the pending state, successfully or not.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.shared.state.lock().0, FutureState::Pending)
    }

    pub fn add_listener(&self, listener: impl ResultListener + 'static) {
        let state = {
            let mut guard = self.shared.state.lock();
            if let FutureState::Pending = guard.0 {
                guard.1.push(Box::new(listener));
                return;
            }
            guard.0.clone()
        };
        fire(&listener, &state);
    }

    /// Waits until the future is resolved.
    pub async fn wait(&self) {
        let mut rx = self.shared.resolved.subscribe();
        // the sender lives as long as `self`, so this only returns once resolved
        let _ = rx.wait_for(|resolved| *resolved).await;
    }

    /// Waits for the result.
    pub async fn get(&self) -> Result<Arc<dyn AnalyzerResult>> {
        self.wait().await;
        self.try_get()
            .unwrap_or_else(|| Err(FlowError::internal("result future resolved without a value")))
    }

    /// The outcome, if the future has resolved.
    pub fn try_get(&self) -> Option<Result<Arc<dyn AnalyzerResult>>> {
        match &self.shared.state.lock().0 {
            FutureState::Pending => None,
            FutureState::Ready(result) => Some(Ok(Arc::clone(result))),
            FutureState::Failed(error) => Some(Err(error.clone())),
        }
    }
}

impl fmt::Debug for AnalyzerResultFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.shared.state.lock().0 {
            FutureState::Pending => "pending",
            FutureState::Ready(_) => "ready",
            FutureState::Failed(_) => "failed",
        };
        f.debug_struct("AnalyzerResultFuture")
            .field("state", &state)
            .finish()
    }
}

impl ResultPromise {
    pub fn complete(mut self, outcome: Result<Arc<dyn AnalyzerResult>>) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(outcome);
        }
    }
}

impl Drop for ResultPromise {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(Err(FlowError::internal(
                "analyzer result promise dropped before completion",
            )));
        }
    }
}
