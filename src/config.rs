//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y expone `AppConfig`, que
//! agrupa la configuración del runner (`LABFLOW_*`) y la del logging.

use std::env;
use std::path::PathBuf;

use lab_core::{ConfigError, RunnerConfig};
use once_cell::sync::Lazy;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv(); // ignora error si no existe .env
});

/// Configuración global de la aplicación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Configuración del runner y los backends.
    pub runner: RunnerConfig,
    /// Filtro de `env_logger` (`LABFLOW_LOG`, por defecto `info`).
    pub log_filter: String,
    /// Directorio para el canal de auditoría a archivos (`LABFLOW_AUDIT_DIR`).
    pub audit_dir: Option<PathBuf>,
    /// Endpoint del canal de auditoría remoto (`LABFLOW_AUDIT_URL`).
    pub audit_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let runner = RunnerConfig::from_lookup(&lookup)?;
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self { runner,
                  log_filter: non_empty("LABFLOW_LOG").unwrap_or_else(|| "info".to_string()),
                  audit_dir: non_empty("LABFLOW_AUDIT_DIR").map(PathBuf::from),
                  audit_url: non_empty("LABFLOW_AUDIT_URL") })
    }
}
