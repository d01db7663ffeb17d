//! Resultado persistido de una tarea.
//!
//! Sólo contiene el fingerprint y los valores de salida: sin timestamps ni
//! datos del backend, de modo que dos ejecuciones equivalentes producen el
//! mismo contenido en cache.

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::{FieldType, Fingerprint};
use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub fingerprint: Fingerprint,
    pub output: IndexMap<String, Value>,
}

impl TaskResult {
    pub fn new(fingerprint: Fingerprint, output: IndexMap<String, Value>) -> Self {
        Self { fingerprint, output }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.output.get(name)
    }

    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> EngineResult<T> {
        let value = self.output
                        .get(name)
                        .ok_or_else(|| EngineError::UnknownField(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| EngineError::Serialization(format!("output '{name}' ({}): {e}",
                                                                                             FieldType::describe(value))))
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.output.keys().map(String::as_str)
    }
}
