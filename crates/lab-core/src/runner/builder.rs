//! Builder del `TaskRunner`.

use std::path::PathBuf;
use std::sync::Arc;

use super::TaskRunner;
use crate::audit::{Auditor, LogChannel};
use crate::config::RunnerConfig;
use crate::errors::EngineResult;
use crate::hashing::HashScope;
use crate::store::{FsResultStore, ResultStore};
use crate::worker::{BackendSpec, WorkerBackend, WorkerOptions, WorkerRegistry};

/// Configura un `TaskRunner`. Por defecto: ejecución directa (sin backend),
/// `FsResultStore`, auditoría deshabilitada y `HashScope::default()`.
#[derive(Debug)]
pub struct TaskRunnerBuilder {
    cache_root: PathBuf,
    backend: Option<Arc<dyn WorkerBackend>>,
    store: Arc<dyn ResultStore>,
    auditor: Auditor,
    scope: HashScope,
    exclusive: bool,
}

impl TaskRunnerBuilder {
    pub(super) fn new(cache_root: PathBuf) -> Self {
        Self { cache_root,
               backend: None,
               store: Arc::new(FsResultStore::new()),
               auditor: Auditor::disabled(),
               scope: HashScope::default(),
               exclusive: false }
    }

    /// Builder a partir de la configuración de entorno. Si hay flags de
    /// auditoría se agrega un `LogChannel`; otros canales se suman con
    /// `auditor()`.
    pub fn from_config(config: &RunnerConfig, registry: &WorkerRegistry) -> EngineResult<Self> {
        let mut auditor = Auditor::new(config.audit).with_context(config.audit_context.clone());
        if !config.audit.is_empty() {
            auditor = auditor.with_channel(Arc::new(LogChannel));
        }
        Ok(Self::new(config.cache_dir.clone()).backend_from(registry, config.worker.as_str(), &config.worker_options())?
                                              .auditor(auditor)
                                              .hash_scope(config.hash_scope())
                                              .exclusive(config.exclusive))
    }

    pub fn backend(mut self, backend: Arc<dyn WorkerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Resuelve el backend ahora: un nombre desconocido falla en la
    /// construcción, no en la primera ejecución.
    pub fn backend_from(mut self,
                        registry: &WorkerRegistry,
                        spec: impl Into<BackendSpec>,
                        options: &WorkerOptions)
                        -> EngineResult<Self> {
        self.backend = Some(registry.resolve(&spec.into(), options)?);
        Ok(self)
    }

    pub fn store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = store;
        self
    }

    pub fn auditor(mut self, auditor: Auditor) -> Self {
        self.auditor = auditor;
        self
    }

    pub fn hash_scope(mut self, scope: HashScope) -> Self {
        self.scope = scope;
        self
    }

    /// Toma el lock consultivo del fingerprint antes de ejecutar.
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn build(self) -> TaskRunner {
        TaskRunner { cache_root: self.cache_root,
                     backend: self.backend,
                     store: self.store,
                     auditor: self.auditor,
                     scope: self.scope,
                     exclusive: self.exclusive }
    }
}
