//! Registro explícito `nombre -> fábrica de backend`.
//!
//! No hay tabla global: cada runner recibe el registro (o un backend ya
//! resuelto) al construirse.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{SerialBackend, WorkerBackend};
use crate::constants::DEFAULT_MAX_WORKERS;
use crate::errors::{EngineError, EngineResult, WorkerError};

/// Parámetros comunes para construir backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    pub max_workers: usize,
    /// Dirección del scheduler para backends distribuidos.
    pub scheduler: Option<String>,
    /// Programa y argumentos de un proceso worker, para backends con procesos.
    pub worker_command: Option<Vec<String>>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { max_workers: DEFAULT_MAX_WORKERS,
               scheduler: None,
               worker_command: None }
    }
}

impl WorkerOptions {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_scheduler(mut self, address: impl Into<String>) -> Self {
        self.scheduler = Some(address.into());
        self
    }

    pub fn with_worker_command<I, S>(mut self, command: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.worker_command = Some(command.into_iter().map(Into::into).collect());
        self
    }
}

pub type BackendFactory = Arc<dyn Fn(&WorkerOptions) -> Result<Arc<dyn WorkerBackend>, WorkerError> + Send + Sync>;

/// Identificador de backend: nombre simbólico o implementación propia.
#[derive(Debug, Clone)]
pub enum BackendSpec {
    Named(String),
    Custom(Arc<dyn WorkerBackend>),
}

impl From<&str> for BackendSpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for BackendSpec {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn WorkerBackend>> for BackendSpec {
    fn from(backend: Arc<dyn WorkerBackend>) -> Self {
        Self::Custom(backend)
    }
}

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    factories: IndexMap<String, BackendFactory>,
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry").field("names", &self.names()).finish()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro con sólo `serial`.
    pub fn with_serial() -> Self {
        Self::new().register(SerialBackend::NAME, |_| Ok(Arc::new(SerialBackend::new())))
    }

    /// Agrega (o reemplaza) una fábrica. El orden de registro se conserva.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
        where F: Fn(&WorkerOptions) -> Result<Arc<dyn WorkerBackend>, WorkerError> + Send + Sync + 'static
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Construye el backend nombrado. Nombres desconocidos fallan con la lista
    /// de nombres válidos.
    pub fn create(&self, name: &str, options: &WorkerOptions) -> EngineResult<Arc<dyn WorkerBackend>> {
        let factory = self.factories
                          .get(name)
                          .ok_or_else(|| EngineError::UnknownBackend { name: name.to_string(),
                                                                       available: self.names() })?;
        Ok(factory(options)?)
    }

    pub fn resolve(&self, spec: &BackendSpec, options: &WorkerOptions) -> EngineResult<Arc<dyn WorkerBackend>> {
        match spec {
            BackendSpec::Named(name) => self.create(name, options),
            BackendSpec::Custom(backend) => Ok(backend.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_registered_names() {
        let registry = WorkerRegistry::with_serial();
        let backend = registry.create("serial", &WorkerOptions::default()).unwrap();
        assert_eq!(backend.name(), "serial");
        assert_eq!(backend.submit(Box::new(|| Ok(json!(2)))).unwrap().result(), Ok(json!(2)));
    }

    #[test]
    fn unknown_name_lists_available() {
        let registry = WorkerRegistry::with_serial().register("pool", |_| Ok(Arc::new(SerialBackend::new())));
        let err = registry.resolve(&"quantum".into(), &WorkerOptions::default()).unwrap_err();
        match err {
            EngineError::UnknownBackend { name, available } => {
                assert_eq!(name, "quantum");
                assert_eq!(available, vec!["serial".to_string(), "pool".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn custom_backend_is_passed_through() {
        let custom: Arc<dyn WorkerBackend> = Arc::new(SerialBackend::new());
        let resolved = WorkerRegistry::new().resolve(&BackendSpec::Custom(custom.clone()), &WorkerOptions::default())
                                            .unwrap();
        assert!(Arc::ptr_eq(&custom, &resolved));
    }

    #[test]
    fn factory_setup_errors_propagate() {
        let registry = WorkerRegistry::new().register("broken", |_| Err(WorkerError::Setup("no scheduler".into())));
        let err = registry.create("broken", &WorkerOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Worker(WorkerError::Setup(_))));
    }
}
