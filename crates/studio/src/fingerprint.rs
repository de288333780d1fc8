use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic 64-bit key derived from everything that influences how a
/// subject looks once photographed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Accumulates visual state into a [`Fingerprint`].
///
/// Backed by SHA-256 rather than `DefaultHasher` so the value is identical
/// across processes, which the durable cache relies on. Strings are length
/// prefixed so adjacent fields cannot alias each other.
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    /// `domain` separates unrelated subject types that happen to share field
    /// values.
    pub fn new(domain: &str) -> Self {
        let mut builder = Self {
            hasher: Sha256::new(),
        };
        builder.write_str(domain);
        builder
    }

    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.hasher.update([u8::from(value)]);
        self
    }

    /// `-0.0` and `0.0` hash the same, as do all NaN payloads.
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        let canonical = if value == 0.0 {
            0.0f32
        } else if value.is_nan() {
            f32::NAN
        } else {
            value
        };
        self.hasher.update(canonical.to_bits().to_le_bytes());
        self
    }

    pub fn write_rgba(&mut self, rgba: [u8; 4]) -> &mut Self {
        self.hasher.update(rgba);
        self
    }

    pub fn finish(&self) -> Fingerprint {
        let digest = self.hasher.clone().finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Fingerprint(u64::from_le_bytes(bytes))
    }
}
