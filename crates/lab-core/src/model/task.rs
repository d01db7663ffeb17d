//! Tarea: esquema de inputs/outputs + cuerpo ejecutable.
//!
//! Una `Task` se construye con `TaskBuilder` a partir de listas de
//! `FieldDecl` (el "schema provider" es puro dato). El cuerpo implementa
//! `TaskBody` y recibe un `TaskContext` con una copia inmutable de los inputs.
//! El runner se encarga del resto: fingerprint, cache, backend y auditoría.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{FieldDecl, FieldType, Fingerprint, InputSet};
use crate::constants::DEFAULT_OUTPUT_FIELD;
use crate::errors::{EngineError, EngineResult};

/// Error producido por el cuerpo de una tarea.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskFailure {
    pub message: String,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<String> for TaskFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for TaskFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<EngineError> for TaskFailure {
    fn from(err: EngineError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<std::io::Error> for TaskFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(format!("io: {err}"))
    }
}

/// Vista que recibe el cuerpo de la tarea durante la ejecución.
pub struct TaskContext<'a> {
    inputs: &'a InputSet,
    output_dir: &'a Path,
    fingerprint: &'a Fingerprint,
}

impl<'a> TaskContext<'a> {
    pub fn new(inputs: &'a InputSet, output_dir: &'a Path, fingerprint: &'a Fingerprint) -> Self {
        Self { inputs,
               output_dir,
               fingerprint }
    }

    pub fn input<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskFailure> {
        self.inputs.get_as(name).map_err(TaskFailure::from)
    }

    pub fn inputs(&self) -> &InputSet {
        self.inputs
    }

    /// Directorio de trabajo exclusivo del fingerprint; la tarea puede escribir
    /// ahí sus archivos de salida.
    pub fn output_dir(&self) -> &Path {
        self.output_dir
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        self.fingerprint
    }
}

/// Cuerpo ejecutable. Debe depender únicamente de los inputs del contexto.
pub trait TaskBody: Send + Sync {
    fn call(&self, ctx: &TaskContext<'_>) -> Result<Value, TaskFailure>;
}

impl<F> TaskBody for F where F: Fn(&TaskContext<'_>) -> Result<Value, TaskFailure> + Send + Sync
{
    fn call(&self, ctx: &TaskContext<'_>) -> Result<Value, TaskFailure> {
        self(ctx)
    }
}

/// Identidad de la tarea; entra al fingerprint según el `HashScope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIdentity {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Clone)]
pub struct Task {
    identity: TaskIdentity,
    inputs: InputSet,
    outputs: Arc<Vec<FieldDecl>>,
    body: Arc<dyn TaskBody>,
    cache_dir: Option<PathBuf>,
    input_sets: IndexMap<String, IndexMap<String, Value>>,
    help: Option<String>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
         .field("identity", &self.identity)
         .field("inputs", &self.inputs.values())
         .field("outputs", &self.output_names())
         .field("cache_dir", &self.cache_dir)
         .finish_non_exhaustive()
    }
}

impl Task {
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> Option<&str> {
        self.identity.version.as_deref()
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    pub fn inputs(&self) -> &InputSet {
        &self.inputs
    }

    /// Reemplaza el valor de un input (el `InputSet` anterior no se modifica).
    pub fn set_input<T: Serialize>(&mut self, name: &str, value: T) -> EngineResult<()> {
        self.inputs = self.inputs.set(name, value)?;
        Ok(())
    }

    pub fn set_inputs<I, K>(&mut self, updates: I) -> EngineResult<()>
        where I: IntoIterator<Item = (K, Value)>,
              K: Into<String>
    {
        self.inputs = self.inputs.replace(updates)?;
        Ok(())
    }

    /// Carga inputs desde un archivo JSON con un objeto `{campo: valor}`.
    pub fn load_inputs_file(&mut self, path: &Path) -> EngineResult<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let parsed: IndexMap<String, Value> =
            serde_json::from_str(&raw).map_err(|e| EngineError::Serialization(format!("{}: {e}", path.display())))?;
        self.set_inputs(parsed)
    }

    /// Guarda un conjunto de inputs con nombre para aplicarlo después.
    pub fn save_input_set(&mut self, name: &str, inputs: IndexMap<String, Value>, force: bool) -> EngineResult<()> {
        if self.input_sets.contains_key(name) && !force {
            return Err(EngineError::InputSetExists(name.to_string()));
        }
        // Validar contra el esquema antes de aceptarlo.
        self.inputs.replace(inputs.clone())?;
        self.input_sets.insert(name.to_string(), inputs);
        Ok(())
    }

    pub fn apply_input_set(&mut self, name: &str) -> EngineResult<()> {
        let set = self.input_sets
                      .get(name)
                      .cloned()
                      .ok_or_else(|| EngineError::UnknownInputSet(name.to_string()))?;
        self.set_inputs(set)
    }

    pub fn input_set_names(&self) -> impl Iterator<Item = &str> {
        self.input_sets.keys().map(String::as_str)
    }

    pub fn output_decls(&self) -> &[FieldDecl] {
        &self.outputs
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    pub fn set_cache_dir(&mut self, dir: impl Into<PathBuf>) {
        self.cache_dir = Some(dir.into());
    }

    pub fn body(&self) -> Arc<dyn TaskBody> {
        self.body.clone()
    }

    /// Texto de ayuda: identidad, inputs (con defaults) y outputs.
    pub fn describe(&self) -> String {
        let mut out = format!("task {}", self.identity.name);
        if let Some(v) = &self.identity.version {
            out.push_str(&format!(" (version {v})"));
        }
        out.push('\n');
        if let Some(help) = &self.help {
            out.push_str(help);
            out.push('\n');
        }
        out.push_str("inputs:\n");
        for d in self.inputs.decls() {
            out.push_str(&describe_field(d));
        }
        out.push_str("outputs:\n");
        for d in self.outputs.iter() {
            out.push_str(&describe_field(d));
        }
        out
    }

    /// Da forma al valor devuelto por el cuerpo según los outputs declarados.
    ///
    /// - un único output recibe el valor tal cual;
    /// - varios outputs aceptan un arreglo (orden de declaración) o un objeto
    ///   con exactamente esos nombres.
    pub fn shape_output(&self, value: Value) -> EngineResult<IndexMap<String, Value>> {
        let decls = self.outputs.as_slice();
        let shape_err = |reason: String| EngineError::OutputShape { task: self.identity.name.clone(),
                                                                    reason };
        let mut shaped = IndexMap::with_capacity(decls.len());
        match (decls, value) {
            ([single], value) => {
                shaped.insert(single.name.clone(), value);
            }
            (many, Value::Array(items)) => {
                if items.len() != many.len() {
                    return Err(shape_err(format!("expected {} values, got {}", many.len(), items.len())));
                }
                for (d, v) in many.iter().zip(items) {
                    shaped.insert(d.name.clone(), v);
                }
            }
            (many, Value::Object(mut map)) => {
                for d in many {
                    let v = map.remove(&d.name)
                               .ok_or_else(|| shape_err(format!("missing output '{}'", d.name)))?;
                    shaped.insert(d.name.clone(), v);
                }
                if let Some(extra) = map.keys().next() {
                    return Err(shape_err(format!("unexpected output '{extra}'")));
                }
            }
            (many, other) => {
                return Err(shape_err(format!("expected {} outputs, got a single {}",
                                             many.len(),
                                             FieldType::describe(&other))))
            }
        }
        for d in decls {
            let v = &shaped[&d.name];
            if !d.ty.accepts(v) {
                return Err(shape_err(format!("field '{}' expects {}, got {}", d.name, d.ty, FieldType::describe(v))));
            }
        }
        Ok(shaped)
    }
}

fn describe_field(d: &FieldDecl) -> String {
    let mut line = format!("  {}: {}", d.name, d.ty);
    if let Some(default) = &d.default {
        line.push_str(&format!(" = {default}"));
    }
    if !d.hashed {
        line.push_str(" [not hashed]");
    }
    if let Some(help) = &d.help {
        line.push_str(&format!("  # {help}"));
    }
    line.push('\n');
    line
}

/// Builder de `Task` a partir de triples `(nombre, tipo, default)`.
pub struct TaskBuilder {
    name: String,
    version: Option<String>,
    inputs: Vec<FieldDecl>,
    outputs: Vec<FieldDecl>,
    body: Option<Arc<dyn TaskBody>>,
    cache_dir: Option<PathBuf>,
    help: Option<String>,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               version: None,
               inputs: Vec::new(),
               outputs: Vec::new(),
               body: None,
               cache_dir: None,
               help: None }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn input(mut self, decl: FieldDecl) -> Self {
        self.inputs.push(decl);
        self
    }

    pub fn output(mut self, decl: FieldDecl) -> Self {
        self.outputs.push(decl);
        self
    }

    pub fn body<F>(self, f: F) -> Self
        where F: Fn(&TaskContext<'_>) -> Result<Value, TaskFailure> + Send + Sync + 'static
    {
        self.body_from(f)
    }

    /// Variante para tipos que implementan `TaskBody` directamente.
    pub fn body_from<B: TaskBody + 'static>(mut self, body: B) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = Some(text.into());
        self
    }

    pub fn build(self) -> EngineResult<Task> {
        let body = self.body
                       .ok_or_else(|| EngineError::Schema(format!("task '{}' has no body", self.name)))?;
        check_unique(&self.inputs, "input")?;
        check_unique(&self.outputs, "output")?;
        for d in &self.inputs {
            if let Some(default) = &d.default {
                if !d.ty.accepts(default) {
                    return Err(EngineError::TypeMismatch { field: d.name.clone(),
                                                           expected: d.ty,
                                                           found: FieldType::describe(default) });
                }
            }
        }
        let outputs = if self.outputs.is_empty() {
            vec![FieldDecl::required(DEFAULT_OUTPUT_FIELD, FieldType::Any)]
        } else {
            self.outputs
        };
        Ok(Task { identity: TaskIdentity { name: self.name,
                                           version: self.version },
                  inputs: InputSet::new(Arc::new(self.inputs)),
                  outputs: Arc::new(outputs),
                  body,
                  cache_dir: self.cache_dir,
                  input_sets: IndexMap::new(),
                  help: self.help })
    }
}

fn check_unique(decls: &[FieldDecl], what: &str) -> EngineResult<()> {
    for (i, d) in decls.iter().enumerate() {
        if decls[..i].iter().any(|o| o.name == d.name) {
            return Err(EngineError::Schema(format!("duplicate {what} field '{}'", d.name)));
        }
    }
    Ok(())
}
