//! Declaración de campos de entrada/salida.
//!
//! El esquema es puro dato: una lista de `(nombre, tipo, default)` que el
//! `TaskBuilder` recibe tal cual. No hay generación dinámica de tipos.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tipo declarado de un campo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Cualquier valor JSON, incluido `null`.
    Any,
    Bool,
    Int,
    /// Acepta enteros y flotantes.
    Float,
    Str,
    /// Ruta usada sólo por su texto.
    Path,
    /// Archivo: el fingerprint incluye el digest de su contenido.
    File,
    Directory,
    List,
    Map,
    /// Recurso vivo (handle, conexión). No tiene forma canónica: sólo puede
    /// declararse fuera del hash.
    Opaque,
}

impl FieldType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any | Self::Opaque => true,
            Self::Bool => value.is_boolean(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Str | Self::Path | Self::File | Self::Directory => value.is_string(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
        }
    }

    /// Nombre del tipo JSON de un valor, usado en mensajes de error.
    pub fn describe(value: &Value) -> String {
        let name = match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(n) if n.is_f64() => "float",
            Value::Number(_) => "int",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "map",
        };
        name.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Path => "path",
            Self::File => "file",
            Self::Directory => "directory",
            Self::List => "list",
            Self::Map => "map",
            Self::Opaque => "opaque",
        };
        f.write_str(s)
    }
}

/// Campo declarado: nombre, tipo y default opcional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: FieldType,
    pub default: Option<Value>,
    /// `false` excluye el campo del fingerprint.
    pub hashed: bool,
    pub help: Option<String>,
}

impl FieldDecl {
    /// Campo sin default (debe recibir valor antes de ejecutar).
    pub fn required(name: impl Into<String>, ty: FieldType) -> Self {
        Self { name: name.into(),
               ty,
               default: None,
               hashed: true,
               help: None }
    }

    pub fn with_default(name: impl Into<String>, ty: FieldType, default: Value) -> Self {
        Self { default: Some(default),
               ..Self::required(name, ty) }
    }

    pub fn skip_hash(mut self) -> Self {
        self.hashed = false;
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = Some(text.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}
