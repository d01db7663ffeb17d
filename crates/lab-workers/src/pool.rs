use lab_core::worker::JobTracker;
use lab_core::{Job, WorkerBackend, WorkerError, WorkerHandle};
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Pool fijo de hilos del sistema. `submit` no bloquea; el trabajo corre en
/// uno de los `max_workers` hilos del pool, dentro del mismo proceso.
#[derive(Debug)]
pub struct ThreadPoolBackend {
    pool: ThreadPool,
    tracker: JobTracker,
}

impl ThreadPoolBackend {
    pub const NAME: &'static str = "threads";

    pub fn new(max_workers: usize) -> Result<Self, WorkerError> {
        let pool = ThreadPoolBuilder::new().num_threads(max_workers.max(1))
                                           .thread_name(|i| format!("labflow-threads-{i}"))
                                           .build()
                                           .map_err(|e| WorkerError::Setup(e.to_string()))?;
        debug!("thread pool started with {} worker(s)", pool.current_num_threads());
        Ok(Self { pool,
                  tracker: JobTracker::new() })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl WorkerBackend for ThreadPoolBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn submit(&self, job: Job) -> Result<WorkerHandle, WorkerError> {
        let (handle, prepared) = self.tracker.prepare(Self::NAME, job)?;
        self.pool.spawn(move || prepared.run());
        Ok(handle)
    }

    fn shutdown(&self) {
        if self.tracker.close() {
            debug!("thread pool shutting down, {} job(s) in flight", self.tracker.in_flight());
        }
        self.tracker.wait_idle();
    }

    fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Barrier};

    #[test]
    fn jobs_run_concurrently() {
        let backend = ThreadPoolBackend::new(2).unwrap();
        assert_eq!(backend.workers(), 2);
        // ambos trabajos deben estar corriendo a la vez para cruzar la barrera
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2).map(|i| {
                                        let b = barrier.clone();
                                        backend.submit(Box::new(move || {
                                                   b.wait();
                                                   Ok(json!(i))
                                               }))
                                               .unwrap()
                                    })
                                    .collect();
        let got: Vec<_> = handles.into_iter().map(|h| h.result().unwrap()).collect();
        assert_eq!(got, vec![json!(0), json!(1)]);
    }
}
