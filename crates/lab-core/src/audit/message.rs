//! Envelope de auditoría `{ "@context", "@id", campos... }`.

use std::ops::{BitOr, BitOrAssign};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::AUDIT_ID_SCHEME;

/// Categorías de auditoría. Un mensaje lleva exactamente una; el `Auditor`
/// sólo lo envía si la categoría está habilitada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditFlags(u8);

impl AuditFlags {
    pub const NONE: AuditFlags = AuditFlags(0);
    /// Eventos de procedencia (inicio/fin de ejecución).
    pub const PROV: AuditFlags = AuditFlags(0x01);
    /// Uso de recursos (duración, backend).
    pub const RESOURCE: AuditFlags = AuditFlags(0x02);
    pub const ALL: AuditFlags = AuditFlags(0x03);

    pub fn contains(self, other: AuditFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Parsea una lista separada por comas: `prov,resource`, `all`, `none`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut flags = Self::NONE;
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            flags |= match part.to_ascii_lowercase().as_str() {
                "prov" | "provenance" => Self::PROV,
                "resource" | "resources" => Self::RESOURCE,
                "all" => Self::ALL,
                "none" => Self::NONE,
                _ => return None,
            };
        }
        Some(flags)
    }
}

impl BitOr for AuditFlags {
    type Output = AuditFlags;
    fn bitor(self, rhs: AuditFlags) -> AuditFlags {
        AuditFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for AuditFlags {
    fn bitor_assign(&mut self, rhs: AuditFlags) {
        self.0 |= rhs.0;
    }
}

/// Timestamp UTC ISO-8601 con precisión de microsegundos.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Identificador `labflow:<uuid-hex>` de una ejecución.
pub fn new_audit_id() -> String {
    format!("{}:{}", AUDIT_ID_SCHEME, Uuid::new_v4().simple())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditMessage {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    pub category: AuditFlags,
}

impl AuditMessage {
    pub fn new(context: impl Into<String>, id: impl Into<String>, category: AuditFlags) -> Self {
        Self { context: context.into(),
               id: id.into(),
               fields: Map::new(),
               category }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("@context".into(), Value::String(self.context.clone()));
        map.insert("@id".into(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}
