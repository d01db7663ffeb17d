use super::{Job, JobTracker, WorkerBackend, WorkerHandle};
use crate::errors::WorkerError;

/// Ejecuta en el hilo llamador; útil para depurar y para resultados
/// deterministas.
#[derive(Debug, Default)]
pub struct SerialBackend {
    tracker: JobTracker,
}

impl SerialBackend {
    pub const NAME: &'static str = "serial";

    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerBackend for SerialBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn submit(&self, job: Job) -> Result<WorkerHandle, WorkerError> {
        let (mut handle, prepared) = self.tracker.prepare(Self::NAME, job)?;
        prepared.run();
        let outcome = handle.try_result().unwrap_or(Err(WorkerError::Disconnected));
        Ok(WorkerHandle::completed(Self::NAME, outcome))
    }

    fn shutdown(&self) {
        self.tracker.close();
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

    #[test]
    fn submit_runs_inline() {
        let backend = SerialBackend::new();
        let mut handle = backend.submit(Box::new(|| Ok(json!(1.5)))).unwrap();
        assert_eq!(handle.try_result(), Some(Ok(json!(1.5))));
        assert_eq!(backend.in_flight(), 0);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let backend = SerialBackend::new();
        backend.shutdown();
        backend.shutdown();
        let err = backend.submit(Box::new(|| Ok(json!(0)))).unwrap_err();
        assert_eq!(err, WorkerError::ShutDown("serial".into()));
    }
}
