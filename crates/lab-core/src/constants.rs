//! Constantes del motor.
//!
//! Algunos valores participan en el cálculo de fingerprints: cambiarlos
//! invalida todas las caches existentes (`ENGINE_VERSION` forma parte del
//! registro hasheado).

/// Versión lógica del formato de fingerprint. Se incluye siempre en el
/// registro canónico para que un cambio incompatible del motor recalcule
/// resultados aunque los inputs no cambien.
pub const ENGINE_VERSION: &str = "L1.0";

/// Nombre del archivo que contiene el `TaskResult` dentro del directorio del
/// fingerprint.
pub const RESULT_FILE: &str = "_result.json";

/// Sufijo del archivo de lock consultivo por fingerprint.
pub const LOCK_SUFFIX: &str = ".lock";

/// Contexto JSON-LD por defecto de los mensajes de auditoría.
pub const DEFAULT_AUDIT_CONTEXT: &str = "https://schema.labflow.org/context.jsonld";

/// Esquema usado en `@id` de los mensajes de auditoría.
pub const AUDIT_ID_SCHEME: &str = "labflow";

/// Nombre del campo de salida cuando la tarea no declara outputs.
pub const DEFAULT_OUTPUT_FIELD: &str = "out";

/// Cantidad de workers por defecto para backends con pool.
pub const DEFAULT_MAX_WORKERS: usize = 4;
