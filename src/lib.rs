//! LabFlow Rust Library
//!
//! Fachada del workspace:
//! - `errors`: error de nivel aplicación que agrupa motor y configuración.
//! - `config`: configuración del proceso (runner + logging) desde el entorno.
//! - `hashing`: JSON canónico y fingerprints (re-export de `lab-core`).
//! - `pipeline`: armado de un `TaskRunner` completo (backend, canales de
//!   auditoría) a partir de `AppConfig`.

pub mod config;
pub mod errors;
pub mod pipeline;

pub use lab_core::hashing;
pub use lab_core::{FieldDecl, FieldType, RunReport, Task, TaskContext, TaskFailure, TaskRunner};

#[cfg(test)]
mod tests {
    use super::errors::CoreError;

    #[test]
    fn core_error_tests() {
        let i = CoreError::Internal("fallo".into()).to_string();
        assert_eq!(i, "Error interno: fallo");
    }

    #[test]
    fn hashing_is_reexported() {
        let v = serde_json::json!({"b": 1, "a": 2});
        assert_eq!(super::hashing::to_canonical_json(&v), "{\"a\":2,\"b\":1}");
    }
}
