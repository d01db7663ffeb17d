use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task;

use crate::errors::WorkerError;

pub type JobOutcome = Result<Value, WorkerError>;

/// Referencia a un trabajo despachado, independiente del backend.
///
/// `result()` bloquea el hilo actual; desde código async conviene `wait()`.
pub struct WorkerHandle {
    backend: String,
    rx: oneshot::Receiver<JobOutcome>,
    cancelled: Arc<AtomicBool>,
    outcome: Option<JobOutcome>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
         .field("backend", &self.backend)
         .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
         .field("outcome", &self.outcome)
         .finish()
    }
}

impl WorkerHandle {
    pub(crate) fn pending(backend: &str, rx: oneshot::Receiver<JobOutcome>, cancelled: Arc<AtomicBool>) -> Self {
        Self { backend: backend.to_string(),
               rx,
               cancelled,
               outcome: None }
    }

    /// Handle ya resuelto.
    pub fn completed(backend: &str, outcome: JobOutcome) -> Self {
        let (_tx, rx) = oneshot::channel();
        Self { backend: backend.to_string(),
               rx,
               cancelled: Arc::new(AtomicBool::new(false)),
               outcome: Some(outcome) }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Bloquea hasta que el trabajo termine. Un handle ya resuelto retorna
    /// sin bloquear. Dentro de un runtime tokio la espera sale del contexto
    /// del runtime: `block_in_place` en multi-thread, un hilo auxiliar en
    /// current-thread.
    pub fn result(mut self) -> JobOutcome {
        if let Some(outcome) = self.try_result() {
            return outcome;
        }
        let rx = self.rx;
        let received = match Handle::try_current() {
            Err(_) => rx.blocking_recv().ok(),
            Ok(rt) if rt.runtime_flavor() == RuntimeFlavor::MultiThread => {
                task::block_in_place(move || rx.blocking_recv().ok())
            }
            Ok(_) => std::thread::scope(|s| s.spawn(move || rx.blocking_recv().ok()).join().ok().flatten()),
        };
        received.unwrap_or(Err(WorkerError::Disconnected))
    }

    pub async fn wait(self) -> JobOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        self.rx.await.unwrap_or(Err(WorkerError::Disconnected))
    }

    /// Sin bloquear: `None` mientras el trabajo sigue en curso.
    pub fn try_result(&mut self) -> Option<JobOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(Err(WorkerError::Disconnected)),
            };
        }
        self.outcome.clone()
    }

    /// Cancelación best-effort: sólo evita que arranque un trabajo que aún no
    /// comenzó. Un trabajo en ejecución (o remoto ya despachado) sigue hasta
    /// el final.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
