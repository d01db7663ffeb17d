//! Canales de auditoría con efectos externos: un archivo por mensaje y POST
//! HTTP a un endpoint remoto.

mod file;
mod remote;

use std::path::PathBuf;
use std::sync::Arc;

use lab_core::{AuditDeliveryError, AuditFlags, Auditor, LogChannel, RunnerConfig};

pub use file::FileChannel;
pub use remote::{RemoteAuth, RemoteChannel};

/// Destinos de auditoría pedidos además de los flags del entorno.
#[derive(Debug, Clone, Default)]
pub struct AuditTargets {
    pub dir: Option<PathBuf>,
    pub url: Option<String>,
    pub auth: RemoteAuth,
}

/// Arma el `Auditor` de un proceso:
/// - con flags en `config.audit` se registra en el log;
/// - `targets` agrega canal de archivos y/o remoto;
/// - destinos explícitos sin flags en el entorno auditan la procedencia.
pub fn configured_auditor(config: &RunnerConfig, targets: AuditTargets) -> Result<Auditor, AuditDeliveryError> {
    let explicit = targets.dir.is_some() || targets.url.is_some();
    let flags = if config.audit.is_empty() && explicit { AuditFlags::PROV } else { config.audit };
    let mut auditor = Auditor::new(flags).with_context(config.audit_context.clone());
    if !config.audit.is_empty() {
        auditor = auditor.with_channel(Arc::new(LogChannel));
    }
    if let Some(dir) = targets.dir {
        auditor = auditor.with_channel(Arc::new(FileChannel::new(dir)));
    }
    if let Some(url) = targets.url {
        auditor = auditor.with_channel(Arc::new(RemoteChannel::new(url)?.with_auth(targets.auth)));
    }
    Ok(auditor)
}
