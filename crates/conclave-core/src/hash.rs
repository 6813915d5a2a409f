//! blake3 digests for plan fingerprints and generated code.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 32-byte blake3 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Leading 12 hex digits, for log lines and listings.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    Hash256(*blake3::hash(bytes).as_bytes())
}

pub fn hash_str(s: &str) -> Hash256 {
    hash_bytes(s.as_bytes())
}

/// Digest of `v`'s JSON encoding, streamed straight into the hasher.
pub fn hash_serde<T: Serialize + ?Sized>(v: &T) -> Result<Hash256> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, v)?;
    Ok(Hash256(*hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_digest_matches_encoded_bytes() {
        let v = vec!["in1", "proj1"];
        let bytes = serde_json::to_vec(&v).unwrap();
        assert_eq!(hash_serde(&v).unwrap(), hash_bytes(&bytes));
    }

    #[test]
    fn hex_forms() {
        let h = hash_str("join");
        assert_eq!(h.to_hex().len(), 64);
        assert_eq!(h.short(), h.to_hex()[..12]);
        assert_eq!(h.to_string(), h.to_hex());
    }
}
