//! Hash helpers – abstracción para cambiar de algoritmo sin tocar el resto del core.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Algoritmo usado para el fingerprint. Ambos producen 64 caracteres hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl HashAlgorithm {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "blake3" => Some(Self::Blake3),
            "sha256" | "sha-256" => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn digest_hex(&self, bytes: &[u8]) -> String {
        match self {
            Self::Blake3 => {
                let mut h = Hasher::new();
                h.update(bytes);
                h.finalize().to_hex().to_string()
            }
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
        }
    }
}

/// SHA-256 del contenido de un archivo, leído por bloques.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
