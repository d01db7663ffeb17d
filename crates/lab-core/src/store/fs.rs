use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, warn};

use super::ResultStore;
use crate::constants::{LOCK_SUFFIX, RESULT_FILE};
use crate::errors::{EngineError, EngineResult};
use crate::model::{Fingerprint, TaskResult};

/// Store sobre el sistema de archivos. Sin estado: cualquier proceso con
/// acceso a la raíz puede leer lo que otro escribió.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsResultStore;

impl FsResultStore {
    pub fn new() -> Self {
        Self
    }

    pub fn result_path(location: &Path, fingerprint: &Fingerprint) -> PathBuf {
        location.join(fingerprint.as_str()).join(RESULT_FILE)
    }

    fn read_entry(path: &Path, fingerprint: &Fingerprint) -> EngineResult<Option<TaskResult>> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::io(path, e)),
        };
        let corrupt = |reason: String| EngineError::CacheCorruption { fingerprint: fingerprint.to_string(),
                                                                      path: path.to_path_buf(),
                                                                      reason };
        let result: TaskResult = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if &result.fingerprint != fingerprint {
            return Err(corrupt(format!("entry belongs to fingerprint {}", result.fingerprint)));
        }
        Ok(Some(result))
    }
}

impl ResultStore for FsResultStore {
    fn locate(&self, fingerprint: &Fingerprint, locations: &[PathBuf]) -> EngineResult<Option<(PathBuf, TaskResult)>> {
        for location in locations {
            let path = Self::result_path(location, fingerprint);
            if let Some(result) = Self::read_entry(&path, fingerprint)? {
                debug!("cache hit {} in {}", fingerprint.short(), location.display());
                return Ok(Some((location.clone(), result)));
            }
        }
        Ok(None)
    }

    fn save(&self, location: &Path, fingerprint: &Fingerprint, result: &TaskResult) -> EngineResult<PathBuf> {
        let dir = location.join(fingerprint.as_str());
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        let final_path = dir.join(RESULT_FILE);
        let bytes = serde_json::to_vec_pretty(result).map_err(|e| EngineError::Serialization(e.to_string()))?;

        // temp + sync + rename: un lector concurrente nunca ve un archivo a medias
        let mut temp = tempfile::Builder::new().prefix(".result-")
                                               .tempfile_in(&dir)
                                               .map_err(|e| EngineError::io(&dir, e))?;
        temp.write_all(&bytes).map_err(|e| EngineError::io(temp.path(), e))?;
        temp.as_file().sync_all().map_err(|e| EngineError::io(temp.path(), e))?;
        temp.persist(&final_path).map_err(|e| EngineError::io(&final_path, e.error))?;
        debug!("saved result {} to {}", fingerprint.short(), final_path.display());
        Ok(final_path)
    }

    fn lock(&self, location: &Path, fingerprint: &Fingerprint) -> EngineResult<Option<FingerprintLock>> {
        FingerprintLock::acquire(location, fingerprint).map(Some)
    }

    fn entries(&self, location: &Path) -> EngineResult<Vec<Fingerprint>> {
        let read = match fs::read_dir(location) {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(location, e)),
        };
        let mut found = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| EngineError::io(location, e))?;
            let name = entry.file_name();
            let Some(fp) = name.to_str().and_then(Fingerprint::parse) else {
                continue;
            };
            if entry.path().join(RESULT_FILE).is_file() {
                found.push(fp);
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Lock exclusivo consultivo sobre `<location>/<fingerprint>.lock`. Al hacer
/// drop se borra el archivo y después se libera el lock.
#[derive(Debug)]
pub struct FingerprintLock {
    file: File,
    path: PathBuf,
}

impl FingerprintLock {
    /// Bloquea hasta obtener el lock.
    pub fn acquire(location: &Path, fingerprint: &Fingerprint) -> EngineResult<Self> {
        fs::create_dir_all(location).map_err(|e| EngineError::io(location, e))?;
        let path = location.join(format!("{}{}", fingerprint.as_str(), LOCK_SUFFIX));
        let file = OpenOptions::new().create(true)
                                     .truncate(false)
                                     .write(true)
                                     .open(&path)
                                     .map_err(|e| EngineError::io(&path, e))?;
        file.lock_exclusive().map_err(|e| EngineError::io(&path, e))?;
        debug!("acquired lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FingerprintLock {
    fn drop(&mut self) {
        // quien ya esperaba sobre este inodo re-chequea la cache al obtenerlo
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("could not remove lock file {}: {e}", self.path.display());
            }
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("could not release lock {}: {e}", self.path.display());
        }
    }
}
