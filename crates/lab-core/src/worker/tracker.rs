use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::oneshot;

use super::{Job, JobOutcome, WorkerHandle};
use crate::errors::WorkerError;

#[derive(Debug, Default)]
struct State {
    closed: bool,
    in_flight: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Contabilidad de trabajos en vuelo compartida por todos los backends.
///
/// `prepare` y `close` se serializan sobre el mismo mutex: un `submit` que
/// corre en paralelo con `shutdown` queda o bien rechazado o bien contado.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    shared: Arc<Shared>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el trabajo y devuelve el par handle / trabajo ejecutable.
    pub fn prepare(&self, backend: &str, job: Job) -> Result<(WorkerHandle, PreparedJob), WorkerError> {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(WorkerError::ShutDown(backend.to_string()));
            }
            state.in_flight += 1;
        }
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = WorkerHandle::pending(backend, rx, cancelled.clone());
        let prepared = PreparedJob { job,
                                     tx,
                                     cancelled,
                                     guard: InFlightGuard { shared: self.shared.clone() } };
        Ok((handle, prepared))
    }

    /// Marca el tracker como cerrado; `true` sólo la primera vez.
    pub fn close(&self) -> bool {
        let mut state = self.shared.lock();
        !std::mem::replace(&mut state.closed, true)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// Bloquea hasta que no quede trabajo en vuelo.
    pub fn wait_idle(&self) {
        let mut state = self.shared.lock();
        while state.in_flight > 0 {
            debug!("waiting for {} in-flight job(s)", state.in_flight);
            state = self.shared.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct InFlightGuard {
    shared: Arc<Shared>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.shared.idle.notify_all();
        }
    }
}

/// Trabajo listo para correr en cualquier sustrato. Si se descarta sin
/// ejecutarse el handle recibe `Disconnected` y deja de contar como en vuelo.
pub struct PreparedJob {
    job: Job,
    tx: oneshot::Sender<JobOutcome>,
    cancelled: Arc<AtomicBool>,
    guard: InFlightGuard,
}

impl PreparedJob {
    /// Ejecuta el trabajo en el hilo actual y entrega el resultado. Los
    /// panics se capturan y se reportan como `WorkerError::Panicked`.
    pub fn run(self) {
        self.run_with(execute_job)
    }

    /// Como `run`, pero el resultado lo produce `exec` (p.ej. otro proceso).
    /// La cancelación previa se respeta igual.
    pub fn run_with(self, exec: impl FnOnce(Job) -> JobOutcome) {
        let PreparedJob { job, tx, cancelled, guard } = self;
        let outcome = if cancelled.load(Ordering::Acquire) {
            Err(WorkerError::Cancelled)
        } else {
            exec(job)
        };
        // el receptor puede haberse descartado; no es un error
        let _ = tx.send(outcome);
        drop(guard);
    }

    /// Termina el trabajo sin ejecutarlo, entregando `error` al handle.
    pub fn abandon(self, error: WorkerError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Corre un `Job` en el hilo actual capturando panics.
pub fn execute_job(job: Job) -> JobOutcome {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(WorkerError::Task(failure)),
        Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskFailure;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn run_reports_value_failure_and_panic() {
        let tracker = JobTracker::new();
        let (h, job) = tracker.prepare("t", Box::new(|| Ok(json!(1)))).unwrap();
        job.run();
        assert_eq!(h.result(), Ok(json!(1)));

        let (h, job) = tracker.prepare("t", Box::new(|| Err(TaskFailure::new("bad input")))).unwrap();
        job.run();
        assert_eq!(h.result(), Err(WorkerError::Task(TaskFailure::new("bad input"))));

        let (h, job) = tracker.prepare("t", Box::new(|| panic!("kaboom"))).unwrap();
        job.run();
        assert_eq!(h.result(), Err(WorkerError::Panicked("kaboom".into())));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn run_with_delivers_external_outcome() {
        let tracker = JobTracker::new();
        let (h, job) = tracker.prepare("t", Box::new(|| panic!("closure is not used"))).unwrap();
        job.run_with(|_| Err(WorkerError::Process("exited".into())));
        assert_eq!(h.result(), Err(WorkerError::Process("exited".into())));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn cancelled_before_start_does_not_run() {
        let tracker = JobTracker::new();
        let (h, job) = tracker.prepare("t", Box::new(|| panic!("must not run"))).unwrap();
        h.cancel();
        job.run();
        assert_eq!(h.result(), Err(WorkerError::Cancelled));
    }

    #[test]
    fn dropped_job_disconnects_and_releases() {
        let tracker = JobTracker::new();
        let (h, job) = tracker.prepare("t", Box::new(|| Ok(json!(null)))).unwrap();
        assert_eq!(tracker.in_flight(), 1);
        drop(job);
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(h.result(), Err(WorkerError::Disconnected));
    }

    #[test]
    fn close_rejects_new_work_and_wait_idle_blocks() {
        let tracker = JobTracker::new();
        let (h, job) = tracker.prepare("t",
                                       Box::new(|| {
                                           std::thread::sleep(Duration::from_millis(50));
                                           Ok(json!("late"))
                                       }))
                              .unwrap();
        let worker = std::thread::spawn(move || job.run());
        assert!(tracker.close());
        assert!(!tracker.close());
        tracker.wait_idle();
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(h.result(), Ok(json!("late")));
        worker.join().unwrap();
        assert!(matches!(tracker.prepare("t", Box::new(|| Ok(json!(0)))), Err(WorkerError::ShutDown(_))));
    }
}
