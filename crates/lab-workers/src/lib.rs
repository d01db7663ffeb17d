//! Backends con pool para `lab-core`: pool de procesos, pool de hilos
//! (rayon), pool de futures (tokio) y cluster distribuido detrás de un
//! `ClusterTransport`.

pub mod cluster;
pub mod futures_pool;
pub mod pool;
pub mod process;

use std::sync::Arc;

use lab_core::{WorkerBackend, WorkerRegistry};

pub use cluster::{ClusterBackend, ClusterTransport, LocalCluster, Rejected};
pub use futures_pool::FuturesPoolBackend;
pub use pool::ThreadPoolBackend;
pub use process::{serve, ProcessPoolBackend, WorkerCommand};

/// Registro con todos los backends de la distribución, en este orden:
/// `serial`, `pool`, `cluster`, `futures`, `threads`.
///
/// `pool` levanta procesos con `WorkerOptions::worker_command` (por defecto el
/// ejecutable actual con el subcomando `worker`). `cluster` levanta un
/// `LocalCluster` en proceso con `max_workers` nodos; un scheduler remoto se
/// registra aparte con `ClusterBackend::new`.
pub fn standard_registry() -> WorkerRegistry {
    WorkerRegistry::with_serial().register(ProcessPoolBackend::NAME, |opts| {
                                     let command = WorkerCommand::from_options(opts)?;
                                     Ok(Arc::new(ProcessPoolBackend::new(command, opts.max_workers)?) as Arc<dyn WorkerBackend>)
                                 })
                                 .register(ClusterBackend::NAME, |opts| {
                                     let address = opts.scheduler.clone().unwrap_or_else(|| "inproc://local".to_string());
                                     let cluster = LocalCluster::start(address, opts.max_workers)?;
                                     Ok(Arc::new(ClusterBackend::new(Arc::new(cluster))?) as Arc<dyn WorkerBackend>)
                                 })
                                 .register(FuturesPoolBackend::NAME, |opts| {
                                     Ok(Arc::new(FuturesPoolBackend::new(opts.max_workers)?) as Arc<dyn WorkerBackend>)
                                 })
                                 .register(ThreadPoolBackend::NAME, |opts| {
                                     Ok(Arc::new(ThreadPoolBackend::new(opts.max_workers)?) as Arc<dyn WorkerBackend>)
                                 })
}
