//! Forma serializable de un trabajo, para backends que ejecutan fuera del
//! proceso. Un closure no cruza la frontera de proceso: el otro lado
//! reconstruye la tarea por nombre desde su propio catálogo y la ejecuta con
//! los inputs recibidos.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{execute_job, JobOutcome};
use crate::errors::WorkerError;
use crate::model::{Fingerprint, Task, TaskContext, TaskFailure};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub inputs: IndexMap<String, Value>,
    pub output_dir: PathBuf,
    pub fingerprint: Fingerprint,
}

impl TaskRequest {
    pub fn new(task: &Task, output_dir: impl Into<PathBuf>, fingerprint: &Fingerprint) -> Self {
        Self { task: task.name().to_string(),
               version: task.version().map(str::to_string),
               inputs: task.inputs().values().clone(),
               output_dir: output_dir.into(),
               fingerprint: fingerprint.clone() }
    }

    /// Ejecuta la solicitud sobre `task`, la definición local con el mismo
    /// nombre. Inputs inválidos o una versión distinta son fallos de la tarea.
    pub fn execute(self, mut task: Task) -> TaskReply {
        if task.version() != self.version.as_deref() {
            return TaskReply::Failed(format!("task '{}' version mismatch: requested {:?}, local {:?}",
                                             self.task,
                                             self.version,
                                             task.version()));
        }
        if let Err(e) = task.set_inputs(self.inputs) {
            return TaskReply::Failed(e.to_string());
        }
        let inputs = task.inputs().clone();
        let body = task.body();
        let (dir, fp) = (self.output_dir, self.fingerprint);
        TaskReply::from(execute_job(Box::new(move || body.call(&TaskContext::new(&inputs, &dir, &fp)))))
    }
}

/// Respuesta a un `TaskRequest`, una línea JSON por solicitud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskReply {
    Completed(Value),
    Failed(String),
    Panicked(String),
}

impl From<JobOutcome> for TaskReply {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            Ok(value) => Self::Completed(value),
            Err(WorkerError::Task(failure)) => Self::Failed(failure.message),
            Err(WorkerError::Panicked(msg)) => Self::Panicked(msg),
            Err(other) => Self::Failed(other.to_string()),
        }
    }
}

impl From<TaskReply> for JobOutcome {
    fn from(reply: TaskReply) -> Self {
        match reply {
            TaskReply::Completed(value) => Ok(value),
            TaskReply::Failed(msg) => Err(WorkerError::Task(TaskFailure::new(msg))),
            TaskReply::Panicked(msg) => Err(WorkerError::Panicked(msg)),
        }
    }
}
