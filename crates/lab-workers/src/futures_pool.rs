use lab_core::worker::JobTracker;
use lab_core::{Job, WorkerBackend, WorkerError, WorkerHandle};
use log::{debug, warn};
use tokio::runtime::{Builder, Runtime};

/// Mismo contrato que `pool`, montado sobre un runtime tokio propio: cada
/// trabajo es un future que corre en el pool bloqueante del runtime, acotado a
/// `max_workers` hilos.
#[derive(Debug)]
pub struct FuturesPoolBackend {
    runtime: Option<Runtime>,
    tracker: JobTracker,
    max_workers: usize,
}

impl FuturesPoolBackend {
    pub const NAME: &'static str = "futures";

    pub fn new(max_workers: usize) -> Result<Self, WorkerError> {
        let max_workers = max_workers.max(1);
        let runtime = Builder::new_multi_thread().worker_threads(1)
                                                 .max_blocking_threads(max_workers)
                                                 .thread_name("labflow-futures")
                                                 .enable_all()
                                                 .build()
                                                 .map_err(|e| WorkerError::Setup(e.to_string()))?;
        Ok(Self { runtime: Some(runtime),
                  tracker: JobTracker::new(),
                  max_workers })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

impl WorkerBackend for FuturesPoolBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn submit(&self, job: Job) -> Result<WorkerHandle, WorkerError> {
        let runtime = self.runtime
                          .as_ref()
                          .ok_or_else(|| WorkerError::ShutDown(Self::NAME.to_string()))?;
        let (handle, prepared) = self.tracker.prepare(Self::NAME, job)?;
        runtime.spawn(async move {
                   if let Err(e) = tokio::task::spawn_blocking(move || prepared.run()).await {
                       warn!("futures pool task aborted: {e}");
                   }
               });
        Ok(handle)
    }

    fn shutdown(&self) {
        if self.tracker.close() {
            debug!("futures pool shutting down, {} job(s) in flight", self.tracker.in_flight());
        }
        self.tracker.wait_idle();
    }

    fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }
}

impl Drop for FuturesPoolBackend {
    fn drop(&mut self) {
        // no bloquear si el drop ocurre dentro de otro runtime
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
