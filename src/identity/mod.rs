//! Durable identifiers and their registries.
//!
//! All id widths are enforced at the boundary with newtypes; raw machine
//! integers never cross a module edge. Overflow is an explicit error, never
//! a wrap.

mod aid;
mod eid;
mod hert;

pub use aid::{AidAttrs, AidRecord, AidRegistry};
pub use eid::{EidRecord, EidRegistry, RegistryStats};
pub use hert::{lp_hash, Hert, HertError, Location};

use serde::{Deserialize, Serialize};

/// Errors raised by id construction and registry allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A value does not fit the id's bit width.
    WidthExceeded { kind: &'static str, value: u64 },
    /// The registry's monotonic allocator ran out of ids.
    Exhausted { registry: &'static str },
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::WidthExceeded { kind, value } => {
                write!(f, "{} value {} exceeds bit width", kind, value)
            }
            IdentityError::Exhausted { registry } => {
                write!(f, "{} registry id space exhausted", registry)
            }
        }
    }
}

impl std::error::Error for IdentityError {}

/// 48-bit entity id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Eid(u64);

impl Eid {
    pub const MAX: u64 = (1 << 48) - 1;

    pub fn new(value: u64) -> Result<Eid, IdentityError> {
        if value > Self::MAX {
            return Err(IdentityError::WidthExceeded {
                kind: "EID",
                value,
            });
        }
        Ok(Eid(value))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 24-bit alias id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Aid(u32);

impl Aid {
    pub const MAX: u32 = (1 << 24) - 1;

    pub fn new(value: u32) -> Result<Aid, IdentityError> {
        if value > Self::MAX {
            return Err(IdentityError::WidthExceeded {
                kind: "AID",
                value: value as u64,
            });
        }
        Ok(Aid(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Aid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 64-bit content-addressed document id. Serializes as a decimal string so
/// JSON consumers never see precision loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Did(u64);

impl Did {
    pub fn from_raw(value: u64) -> Did {
        Did(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// SHA-256 over `(lowercased-trimmed-URI, content-hash, version)`,
    /// truncated to the first 8 bytes big-endian.
    pub fn derive(uri: &str, content: &[u8], version: u32) -> Did {
        let content_hash = ares_core::canonical::sha256_hex(content);
        let material = format!(
            "{}\0{}\0{}",
            uri.trim().to_lowercase(),
            content_hash,
            version
        );
        let digest = ares_core::canonical::sha256(material.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Did(u64::from_be_bytes(bytes))
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Did {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>()
            .map(Did)
            .map_err(|e| serde::de::Error::custom(format!("invalid DID '{}': {}", s, e)))
    }
}

/// 20-bit location-pointer hash for drift detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LpHash(u32);

impl LpHash {
    pub const MAX: u32 = (1 << 20) - 1;

    pub fn new(value: u32) -> Result<LpHash, IdentityError> {
        if value > Self::MAX {
            return Err(IdentityError::WidthExceeded {
                kind: "LP hash",
                value: value as u64,
            });
        }
        Ok(LpHash(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eid_rejects_past_48_bits() {
        assert!(Eid::new(Eid::MAX).is_ok());
        assert_eq!(
            Eid::new(Eid::MAX + 1),
            Err(IdentityError::WidthExceeded {
                kind: "EID",
                value: Eid::MAX + 1
            })
        );
    }

    #[test]
    fn aid_rejects_past_24_bits() {
        assert!(Aid::new(Aid::MAX).is_ok());
        assert!(Aid::new(Aid::MAX + 1).is_err());
    }

    #[test]
    fn did_serializes_as_decimal_string() {
        let did = Did::from_raw(u64::MAX);
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, "\"18446744073709551615\"");
        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(back, did);
    }

    #[test]
    fn did_derivation_is_stable_and_uri_normalized() {
        let a = Did::derive("  HTTP://Example.com/Doc ", b"content", 1);
        let b = Did::derive("http://example.com/doc", b"content", 1);
        assert_eq!(a, b);
        let c = Did::derive("http://example.com/doc", b"content", 2);
        assert_ne!(a, c);
    }
}
