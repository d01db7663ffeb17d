use std::fs;
use std::path::{Path, PathBuf};

use lab_core::{AuditChannel, AuditContext, AuditDeliveryError, AuditMessage, Delivery};
use log::debug;
use uuid::Uuid;

/// Escribe cada mensaje como JSON indentado en `<dir>/<uuid>.jsonld`.
#[derive(Debug, Clone)]
pub struct FileChannel {
    dir: PathBuf,
}

impl FileChannel {
    pub const NAME: &'static str = "file";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AuditChannel for FileChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn send(&self, message: &AuditMessage, context: &AuditContext) -> Result<Delivery, AuditDeliveryError> {
        let io_err = |source| AuditDeliveryError::Io { channel: Self::NAME.to_string(),
                                                       source };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let bytes = serde_json::to_vec_pretty(message).map_err(|e| AuditDeliveryError::Serialize { channel: Self::NAME.to_string(),
                                                                                                     reason: e.to_string() })?;
        let path = self.dir.join(format!("{}.jsonld", Uuid::new_v4().simple()));
        fs::write(&path, bytes).map_err(io_err)?;
        debug!("audit message for '{}' written to {}", context.task, path.display());
        Ok(Delivery::Written(path))
    }
}
