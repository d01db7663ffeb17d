//! Abstracción de backends de ejecución.
//!
//! Todos los backends comparten el mismo contrato: `submit` devuelve siempre
//! un `WorkerHandle` (nunca "fire and forget") y `shutdown` bloquea hasta que
//! el trabajo en vuelo terminó o fue cancelado. El runner no sabe qué
//! sustrato ejecuta el cuerpo.

mod handle;
mod registry;
mod request;
mod serial;
mod tracker;

use std::fmt::Debug;

use serde_json::Value;

pub use handle::{JobOutcome, WorkerHandle};
pub use registry::{BackendFactory, BackendSpec, WorkerOptions, WorkerRegistry};
pub use request::{TaskReply, TaskRequest};
pub use serial::SerialBackend;
pub use tracker::{execute_job, JobTracker, PreparedJob};

use crate::errors::WorkerError;
use crate::model::TaskFailure;

/// Unidad de trabajo enviada a un backend: el cuerpo de la tarea ya ligado a
/// sus argumentos.
pub type Job = Box<dyn FnOnce() -> Result<Value, TaskFailure> + Send + 'static>;

pub trait WorkerBackend: Send + Sync + Debug {
    /// Nombre con el que se registró el backend.
    fn name(&self) -> &str;

    /// Encola el trabajo. Los backends con pool no bloquean; `serial` ejecuta
    /// en el hilo llamador y devuelve un handle ya completado.
    fn submit(&self, job: Job) -> Result<WorkerHandle, WorkerError>;

    /// Despacho de una ejecución de tarea. `request` describe el mismo trabajo
    /// que `job` en forma serializable; los backends en proceso lo ignoran y
    /// los que ejecutan en otro proceso ignoran `job`.
    fn submit_task(&self, request: TaskRequest, job: Job) -> Result<WorkerHandle, WorkerError> {
        let _ = request;
        self.submit(job)
    }

    /// Deja de aceptar trabajo y espera al trabajo en vuelo. Idempotente.
    fn shutdown(&self);

    /// Trabajos enviados que todavía no reportaron resultado.
    fn in_flight(&self) -> usize;
}
