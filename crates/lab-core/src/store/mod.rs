//! Persistencia direccionada por contenido de `TaskResult`.
//!
//! Layout en disco: `<location>/<fingerprint>/_result.json`. El store es la
//! única autoridad sobre qué está "ya calculado": un directorio de fingerprint
//! sin archivo de resultado (p.ej. tras un fallo) no cuenta como hit.

mod fs;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub use fs::{FingerprintLock, FsResultStore};

use crate::errors::EngineResult;
use crate::model::{Fingerprint, TaskResult};

/// Contrato del store de resultados.
pub trait ResultStore: Send + Sync + Debug {
    /// Recorre `locations` en orden; devuelve el primer resultado encontrado
    /// junto con la ubicación que lo contiene. Ausente no es error; contenido
    /// ilegible es `CacheCorruption`.
    fn locate(&self, fingerprint: &Fingerprint, locations: &[PathBuf]) -> EngineResult<Option<(PathBuf, TaskResult)>>;

    /// Como `locate`, sin la ubicación.
    fn load(&self, fingerprint: &Fingerprint, locations: &[PathBuf]) -> EngineResult<Option<TaskResult>> {
        Ok(self.locate(fingerprint, locations)?.map(|(_, result)| result))
    }

    /// Escribe el resultado de forma atómica y devuelve la ruta final.
    fn save(&self, location: &Path, fingerprint: &Fingerprint, result: &TaskResult) -> EngineResult<PathBuf>;

    /// Lock consultivo por fingerprint. Por defecto no hay locking. El
    /// archivo de lock se borra cuando el lock se libera.
    fn lock(&self, _location: &Path, _fingerprint: &Fingerprint) -> EngineResult<Option<FingerprintLock>> {
        Ok(None)
    }

    /// Fingerprints con resultado guardado en `location`.
    fn entries(&self, location: &Path) -> EngineResult<Vec<Fingerprint>>;
}

/// Agrega `extra` al final de `locations` si no está presente.
pub fn with_location(mut locations: Vec<PathBuf>, extra: &Path) -> Vec<PathBuf> {
    if !locations.iter().any(|l| l == extra) {
        locations.push(extra.to_path_buf());
    }
    locations
}
