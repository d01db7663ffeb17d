//! Modelos neutrales: esquema de campos, inputs, fingerprint, resultado y tarea.

pub mod fingerprint;
pub mod inputs;
pub mod result;
pub mod schema;
pub mod status;
pub mod task;

pub use fingerprint::Fingerprint;
pub use inputs::InputSet;
pub use result::TaskResult;
pub use schema::{FieldDecl, FieldType};
pub use status::RunState;
pub use task::{Task, TaskBody, TaskBuilder, TaskContext, TaskFailure, TaskIdentity};
