//! Errores del core.
//!
//! `EngineError` es el error que ve el llamador de `TaskRunner::run`. Los
//! errores de backend (`WorkerError`) y de canales de auditoría
//! (`AuditDeliveryError`) tienen su propio tipo porque viajan por canales
//! distintos: el primero por `WorkerHandle::result`, el segundo nunca sale del
//! `Auditor`.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{FieldType, TaskFailure};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input '{field}' cannot be hashed: {reason}")]
    UnhashableInput { field: String, reason: String },
    #[error("cache entry {fingerprint} at {path} is corrupt: {reason}")]
    CacheCorruption { fingerprint: String, path: PathBuf, reason: String },
    #[error("unknown worker backend '{name}'; available: {}", available.join(", "))]
    UnknownBackend { name: String, available: Vec<String> },
    #[error("task '{task}' failed: {source}")]
    TaskExecution {
        task: String,
        #[source]
        source: WorkerError,
    },
    #[error("missing required input '{0}'")]
    MissingInput(String),
    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch { field: String, expected: FieldType, found: String },
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("input set '{0}' already saved; use force to override")]
    InputSetExists(String),
    #[error("unknown input set '{0}'")]
    UnknownInputSet(String),
    #[error("output of task '{task}' does not match its schema: {reason}")]
    OutputShape { task: String, reason: String },
    #[error("worker backend refused the job: {0}")]
    Worker(#[from] WorkerError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid task definition: {0}")]
    Schema(String),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// `true` para errores que provienen del cuerpo de la tarea (estado FAILED).
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskExecution { .. } | Self::OutputShape { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Errores reportados por un backend a través de `WorkerHandle`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkerError {
    #[error("{0}")]
    Task(TaskFailure),
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job cancelled before it started")]
    Cancelled,
    #[error("backend '{0}' is shut down")]
    ShutDown(String),
    #[error("cluster error: {0}")]
    Cluster(String),
    #[error("worker process error: {0}")]
    Process(String),
    #[error("worker dropped the job without reporting a result")]
    Disconnected,
    #[error("backend setup failed: {0}")]
    Setup(String),
}

/// Fallo al entregar un mensaje de auditoría. Nunca aborta una ejecución.
#[derive(Debug, Error)]
pub enum AuditDeliveryError {
    #[error("channel '{channel}' io error: {source}")]
    Io {
        channel: String,
        #[source]
        source: std::io::Error,
    },
    #[error("channel '{channel}' could not serialize message: {reason}")]
    Serialize { channel: String, reason: String },
    #[error("channel '{channel}' transport error: {reason}")]
    Transport { channel: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_lists_names() {
        let err = EngineError::UnknownBackend { name: "quantum".into(),
                                                available: vec!["serial".into(), "pool".into(), "cluster".into()] };
        assert_eq!(err.to_string(), "unknown worker backend 'quantum'; available: serial, pool, cluster");
    }

    #[test]
    fn task_execution_wraps_worker_error() {
        let err = EngineError::TaskExecution { task: "add".into(),
                                               source: WorkerError::Task(TaskFailure::new("boom")) };
        assert_eq!(err.to_string(), "task 'add' failed: boom");
        assert!(err.is_task_failure());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn io_variant_keeps_path() {
        let err = EngineError::io("/tmp/x", std::io::Error::other("falló IO"));
        assert_eq!(err.to_string(), "io error at /tmp/x: falló IO");
        assert!(!err.is_task_failure());
    }
}
