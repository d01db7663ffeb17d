//! Hashing: canonicalización JSON, algoritmos y fingerprint de inputs.

pub mod canonical_json;
pub mod fingerprint;
pub mod hash;

pub use canonical_json::to_canonical_json;
pub use fingerprint::{fingerprint, fingerprint_inputs, resolve_inputs, HashScope};
pub use hash::{file_digest, HashAlgorithm};
