//! Cache keys
//!
//! A key is an opaque byte string computed by the build system. It travels
//! to the external commands as lowercase hex in `CACHE_KEY`.

use crate::error::{PipecacheError, PipecacheResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Environment variable carrying the hex-encoded key to the external command
pub const CACHE_KEY_ENV: &str = "CACHE_KEY";

/// Opaque identifier of one cached artifact set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<u8>);

impl CacheKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a key from its hex form
    pub fn parse_hex(text: &str) -> PipecacheResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipecacheError::InvalidKey {
                key: text.to_string(),
                reason: "key is empty".to_string(),
            });
        }
        hex::decode(text)
            .map(Self)
            .map_err(|e| PipecacheError::InvalidKey {
                key: text.to_string(),
                reason: e.to_string(),
            })
    }

    /// Derive a key as the SHA256 digest of the given input files, in order
    pub fn digest_files<P: AsRef<Path>>(paths: &[P]) -> PipecacheResult<Self> {
        let mut hasher = Sha256::new();

        for path in paths {
            let path = path.as_ref();
            let contents = fs::read(path).map_err(|e| {
                PipecacheError::io(format!("reading key input {}", path.display()), e)
            })?;
            // Length prefix keeps ["ab", "c"] and ["a", "bc"] apart
            hasher.update((contents.len() as u64).to_le_bytes());
            hasher.update(&contents);
        }

        let key = Self(hasher.finalize().to_vec());
        debug!("Derived key {} from {} inputs", key, paths.len());
        Ok(key)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex form, two characters per byte
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
