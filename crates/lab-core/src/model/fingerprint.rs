use std::fmt;

use serde::{Deserialize, Serialize};

/// Hash hex de 64 caracteres del registro canónico de inputs. Es la clave de
/// la cache y el nombre del directorio de trabajo de la tarea.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const LEN: usize = 64;

    /// Valida un fingerprint recibido desde fuera (CLI, nombres de directorio).
    pub fn parse(raw: &str) -> Option<Self> {
        let ok = raw.len() == Self::LEN && raw.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        ok.then(|| Self(raw.to_string()))
    }

    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefijo corto para logs.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
