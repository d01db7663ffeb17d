//! Fingerprint de un conjunto de inputs.
//!
//! Se hashea el registro completo (no hashes por campo) serializado como JSON
//! canónico, de modo que cualquier cambio estructural invalida la cache:
//!
//! ```json
//! {"engine": "L1.0", "inputs": {...}, "task": {...}?, "environment": "..."?}
//! ```
//!
//! Qué entra además de los inputs lo decide `HashScope`.

use std::path::Path;

use serde_json::{json, Map, Value};

use super::{file_digest, to_canonical_json, HashAlgorithm};
use crate::constants::ENGINE_VERSION;
use crate::errors::{EngineError, EngineResult};
use crate::model::{FieldType, Fingerprint, InputSet, TaskIdentity};

/// Alcance del fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashScope {
    pub algorithm: HashAlgorithm,
    /// Incluir nombre y versión de la tarea (por defecto sí: dos tareas
    /// distintas con los mismos inputs no comparten resultado).
    pub include_task: bool,
    /// Identidad del entorno de ejecución (p.ej. digest de contenedor).
    pub environment: Option<String>,
    task: Option<TaskIdentity>,
}

impl Default for HashScope {
    fn default() -> Self {
        Self { algorithm: HashAlgorithm::default(),
               include_task: true,
               environment: None,
               task: None }
    }
}

impl HashScope {
    /// Sólo versión del motor + inputs.
    pub fn inputs_only() -> Self {
        Self { include_task: false,
               ..Self::default() }
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Copia del scope ligada a una tarea concreta.
    pub fn bind_task(&self, task: &TaskIdentity) -> Self {
        let mut scoped = self.clone();
        scoped.task = self.include_task.then(|| task.clone());
        scoped
    }
}

/// Fingerprint de un mapeo `campo -> valor` ya resuelto. Puro y determinista:
/// el orden de inserción de los campos no importa.
pub fn fingerprint(inputs: &Map<String, Value>, scope: &HashScope) -> Fingerprint {
    let mut record = json!({
        "engine": ENGINE_VERSION,
        "inputs": Value::Object(inputs.clone()),
    });
    if let Some(task) = &scope.task {
        record["task"] = json!({ "name": task.name, "version": task.version });
    }
    if let Some(env) = &scope.environment {
        record["environment"] = Value::String(env.clone());
    }
    Fingerprint::from_digest(scope.algorithm.digest_hex(to_canonical_json(&record).as_bytes()))
}

/// Resuelve los valores que entran al hash:
/// - campos con `hashed: false` se omiten;
/// - `Opaque` no tiene forma canónica y falla;
/// - `File` se reemplaza por `{path, digest}` con el SHA-256 del contenido.
pub fn resolve_inputs(inputs: &InputSet) -> EngineResult<Map<String, Value>> {
    let mut resolved = Map::new();
    for decl in inputs.decls().iter().filter(|d| d.hashed) {
        let value = inputs.get(&decl.name)
                          .ok_or_else(|| EngineError::MissingInput(decl.name.clone()))?;
        let entry = match decl.ty {
            FieldType::Opaque => {
                return Err(EngineError::UnhashableInput { field: decl.name.clone(),
                                                          reason: "opaque values have no canonical form".into() })
            }
            FieldType::File => {
                let path = value.as_str().unwrap_or_default();
                let digest = file_digest(Path::new(path)).map_err(|e| EngineError::UnhashableInput {
                                                           field: decl.name.clone(),
                                                           reason: format!("cannot read {path}: {e}"),
                                                       })?;
                json!({ "path": path, "digest": digest })
            }
            _ => value.clone(),
        };
        resolved.insert(decl.name.clone(), entry);
    }
    Ok(resolved)
}

/// `resolve_inputs` + `fingerprint` ligados a la identidad de la tarea.
pub fn fingerprint_inputs(inputs: &InputSet, scope: &HashScope) -> EngineResult<Fingerprint> {
    Ok(fingerprint(&resolve_inputs(inputs)?, scope))
}
