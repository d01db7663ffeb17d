//! Motor de ejecución de tareas con cache direccionada por contenido.
//!
//! Flujo de una ejecución:
//! 1. `hashing` calcula el fingerprint de los inputs resueltos.
//! 2. `store` busca un resultado previo en las ubicaciones de cache.
//! 3. En un miss, `runner` audita el inicio, despacha el cuerpo (directo o
//!    por un `worker::WorkerBackend`), persiste el resultado y audita el fin.

pub mod audit;
pub mod config;
pub mod constants;
pub mod errors;
pub mod hashing;
pub mod model;
pub mod runner;
pub mod store;
pub mod worker;

pub use audit::{AuditChannel, AuditContext, AuditFlags, AuditMessage, Auditor, Delivery, LogChannel, MemoryChannel};
pub use config::{ConfigError, RunnerConfig};
pub use errors::{AuditDeliveryError, EngineError, EngineResult, WorkerError};
pub use hashing::{fingerprint, HashAlgorithm, HashScope};
pub use model::{FieldDecl, FieldType, Fingerprint, InputSet, RunState, Task, TaskBody, TaskBuilder, TaskContext,
                TaskFailure, TaskIdentity, TaskResult};
pub use runner::{RunReport, TaskRunner, TaskRunnerBuilder};
pub use store::{FsResultStore, ResultStore};
pub use worker::{BackendSpec, Job, SerialBackend, TaskReply, TaskRequest, WorkerBackend, WorkerHandle, WorkerOptions,
                 WorkerRegistry};
