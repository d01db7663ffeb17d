//! Conjunto de inputs resueltos de una tarea.
//!
//! `InputSet` es inmutable por convención: todo cambio produce un valor nuevo
//! (`replace`, `set`) para que el fingerprint refleje exactamente un conjunto
//! de inputs a la vez.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{FieldDecl, FieldType};
use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub struct InputSet {
    decls: Arc<Vec<FieldDecl>>,
    values: IndexMap<String, Value>,
}

impl InputSet {
    /// Crea el conjunto inicial: sólo los campos con default tienen valor.
    pub fn new(decls: Arc<Vec<FieldDecl>>) -> Self {
        let values = decls.iter()
                          .filter_map(|d| d.default.clone().map(|v| (d.name.clone(), v)))
                          .collect();
        Self { decls, values }
    }

    pub fn decls(&self) -> &[FieldDecl] {
        &self.decls
    }

    pub fn decl(&self, name: &str) -> Option<&FieldDecl> {
        self.decls.iter().find(|d| d.name == name)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Decodifica un input a un tipo concreto.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> EngineResult<T> {
        let value = self.values
                        .get(name)
                        .ok_or_else(|| EngineError::MissingInput(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|_| EngineError::TypeMismatch { field: name.to_string(),
                                                                                      expected: self.decl(name)
                                                                                                    .map(|d| d.ty)
                                                                                                    .unwrap_or(FieldType::Any),
                                                                                      found: FieldType::describe(value) })
    }

    /// Devuelve un conjunto nuevo con `updates` aplicados. Valida nombres y tipos.
    pub fn replace<I, K>(&self, updates: I) -> EngineResult<InputSet>
        where I: IntoIterator<Item = (K, Value)>,
              K: Into<String>
    {
        let mut values = self.values.clone();
        for (name, value) in updates {
            let name = name.into();
            let decl = self.decl(&name).ok_or_else(|| EngineError::UnknownField(name.clone()))?;
            if !decl.ty.accepts(&value) {
                return Err(EngineError::TypeMismatch { field: name,
                                                       expected: decl.ty,
                                                       found: FieldType::describe(&value) });
            }
            values.insert(name, value);
        }
        Ok(Self { decls: self.decls.clone(),
                  values })
    }

    /// Igual que `replace` para un único campo tipado. Un valor que no puede
    /// convertirse a JSON no tiene forma canónica y se rechaza aquí.
    pub fn set<T: Serialize>(&self, name: &str, value: T) -> EngineResult<InputSet> {
        let value = serde_json::to_value(value).map_err(|e| EngineError::UnhashableInput { field: name.to_string(),
                                                                                            reason: e.to_string() })?;
        self.replace([(name, value)])
    }

    /// Campos requeridos sin valor, en orden de declaración.
    pub fn missing_required(&self) -> Vec<&str> {
        self.decls
            .iter()
            .filter(|d| !self.values.contains_key(&d.name))
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn ensure_complete(&self) -> EngineResult<()> {
        match self.missing_required().first() {
            Some(name) => Err(EngineError::MissingInput((*name).to_string())),
            None => Ok(()),
        }
    }

    /// Objeto JSON con los valores en orden de declaración.
    pub fn to_json(&self) -> Value {
        let map = self.decls
                      .iter()
                      .filter_map(|d| self.values.get(&d.name).map(|v| (d.name.clone(), v.clone())))
                      .collect();
        Value::Object(map)
    }
}
