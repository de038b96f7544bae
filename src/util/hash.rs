//! SHA-256 digests for stamps, source manifests and command lines.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Digest over a sequence of fields.
///
/// Fields are NUL-terminated, so `["ab", "c"]` and `["a", "bc"]` differ.
#[derive(Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        self.hasher.update(value.as_ref());
        self.hasher.update([0u8]);
        self
    }

    pub fn fields<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        for value in values {
            self.field(value);
        }
        self
    }

    /// Absent and empty are distinct.
    pub fn optional(&mut self, value: Option<impl AsRef<[u8]>>) -> &mut Self {
        match value {
            Some(v) => {
                self.hasher.update([1u8]);
                self.field(v)
            }
            None => {
                self.hasher.update([2u8]);
                self
            }
        }
    }

    pub fn path(&mut self, path: &Path) -> &mut Self {
        self.field(path.to_string_lossy().as_bytes())
    }

    pub fn hex(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    /// First 16 hex digits; enough to tell command lines apart.
    pub fn short(&self) -> String {
        let mut digest = self.hex();
        digest.truncate(16);
        digest
    }
}
