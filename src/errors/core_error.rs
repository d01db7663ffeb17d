use lab_core::{ConfigError, EngineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Error interno: {0}")]
    Internal(String),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error de configuración: {0}")]
    Config(#[from] ConfigError),
    #[error("Error del motor: {0}")]
    Engine(#[from] EngineError),
}

impl CoreError {
    /// Código de salida para binarios: 3 si falló el cuerpo de una tarea, 2 para
    /// errores de configuración/backend, 5 para el resto.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Engine(e) if e.is_task_failure() => 3,
            Self::Config(_) | Self::Engine(EngineError::UnknownBackend { .. }) => 2,
            _ => 5,
        }
    }
}
