//! Configuración del runner desde variables de entorno (`.env` opcional).
//!
//! | variable | default |
//! |---|---|
//! | `LABFLOW_CACHE_DIR` | `.labflow-cache` |
//! | `LABFLOW_WORKER` | `serial` |
//! | `LABFLOW_MAX_WORKERS` | `4` |
//! | `LABFLOW_SCHEDULER` | sin definir |
//! | `LABFLOW_WORKER_COMMAND` | ejecutable actual + `worker` |
//! | `LABFLOW_AUDIT` | `none` (lista `prov,resource`) |
//! | `LABFLOW_AUDIT_CONTEXT` | contexto por defecto |
//! | `LABFLOW_HASH` | `blake3` |
//! | `LABFLOW_ENVIRONMENT` | sin definir |
//! | `LABFLOW_EXCLUSIVE` | `false` |

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::audit::AuditFlags;
use crate::constants::{DEFAULT_AUDIT_CONTEXT, DEFAULT_MAX_WORKERS};
use crate::hashing::{HashAlgorithm, HashScope};
use crate::worker::WorkerOptions;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub cache_dir: PathBuf,
    pub worker: String,
    pub max_workers: usize,
    pub scheduler: Option<String>,
    /// Comando que levanta un proceso del pool (`pool`).
    pub worker_command: Option<Vec<String>>,
    pub audit: AuditFlags,
    pub audit_context: String,
    pub hash: HashAlgorithm,
    pub environment: Option<String>,
    pub exclusive: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { cache_dir: PathBuf::from(".labflow-cache"),
               worker: "serial".to_string(),
               max_workers: DEFAULT_MAX_WORKERS,
               scheduler: None,
               worker_command: None,
               audit: AuditFlags::NONE,
               audit_context: DEFAULT_AUDIT_CONTEXT.to_string(),
               hash: HashAlgorithm::default(),
               environment: None,
               exclusive: false }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una función de búsqueda arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("LABFLOW_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LABFLOW_WORKER") {
            cfg.worker = v.trim().to_string();
        }
        if let Some(v) = lookup("LABFLOW_MAX_WORKERS") {
            cfg.max_workers = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("LABFLOW_MAX_WORKERS", &v, "expected a positive integer")),
            };
        }
        cfg.scheduler = lookup("LABFLOW_SCHEDULER").filter(|s| !s.trim().is_empty());
        cfg.worker_command = lookup("LABFLOW_WORKER_COMMAND").map(|v| v.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                                                             .filter(|words| !words.is_empty());
        if let Some(v) = lookup("LABFLOW_AUDIT") {
            cfg.audit = AuditFlags::parse(&v).ok_or_else(|| invalid("LABFLOW_AUDIT", &v, "expected prov, resource, all or none"))?;
        }
        if let Some(v) = lookup("LABFLOW_AUDIT_CONTEXT") {
            cfg.audit_context = v;
        }
        if let Some(v) = lookup("LABFLOW_HASH") {
            cfg.hash = HashAlgorithm::parse(&v).ok_or_else(|| invalid("LABFLOW_HASH", &v, "expected blake3 or sha256"))?;
        }
        cfg.environment = lookup("LABFLOW_ENVIRONMENT").filter(|s| !s.trim().is_empty());
        if let Some(v) = lookup("LABFLOW_EXCLUSIVE") {
            cfg.exclusive = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(invalid("LABFLOW_EXCLUSIVE", &v, "expected a boolean")),
            };
        }
        Ok(cfg)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        let mut options = WorkerOptions::default().with_max_workers(self.max_workers);
        if let Some(addr) = &self.scheduler {
            options = options.with_scheduler(addr.clone());
        }
        if let Some(command) = &self.worker_command {
            options = options.with_worker_command(command.clone());
        }
        options
    }

    pub fn hash_scope(&self) -> HashScope {
        let scope = HashScope::default().with_algorithm(self.hash);
        match &self.environment {
            Some(env) => scope.with_environment(env.clone()),
            None => scope,
        }
    }
}

fn invalid(var: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError { var: var.to_string(),
                  value: value.to_string(),
                  reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(RunnerConfig::from_lookup(lookup(&[])).unwrap(), RunnerConfig::default());
    }

    #[test]
    fn parses_all_variables() {
        let cfg = RunnerConfig::from_lookup(lookup(&[("LABFLOW_CACHE_DIR", "/tmp/c"),
                                                     ("LABFLOW_WORKER", "pool"),
                                                     ("LABFLOW_MAX_WORKERS", "8"),
                                                     ("LABFLOW_AUDIT", "prov,resource"),
                                                     ("LABFLOW_HASH", "sha256"),
                                                     ("LABFLOW_ENVIRONMENT", "docker:abc"),
                                                     ("LABFLOW_EXCLUSIVE", "yes"),
                                                     ("LABFLOW_WORKER_COMMAND", "/usr/bin/lab  worker")])).unwrap();
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp/c"));
        assert_eq!(cfg.worker, "pool");
        assert_eq!(cfg.worker_options().max_workers, 8);
        assert_eq!(cfg.audit, AuditFlags::ALL);
        assert_eq!(cfg.hash, HashAlgorithm::Sha256);
        assert!(cfg.exclusive);
        assert_eq!(cfg.hash_scope().environment.as_deref(), Some("docker:abc"));
        assert_eq!(cfg.worker_options().worker_command,
                   Some(vec!["/usr/bin/lab".to_string(), "worker".to_string()]));
    }

    #[test]
    fn rejects_bad_values() {
        let err = RunnerConfig::from_lookup(lookup(&[("LABFLOW_MAX_WORKERS", "0")])).unwrap_err();
        assert_eq!(err.var, "LABFLOW_MAX_WORKERS");
        assert!(RunnerConfig::from_lookup(lookup(&[("LABFLOW_HASH", "md5")])).is_err());
        assert!(RunnerConfig::from_lookup(lookup(&[("LABFLOW_AUDIT", "everything")])).is_err());
    }
}
