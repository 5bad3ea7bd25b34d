//! Transaction identifiers.

use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Errors from parsing a hex-encoded transaction id.
///
/// Not `Eq`: the wrapped `hex::FromHexError` only implements `PartialEq`.
#[derive(Debug, Error, PartialEq)]
pub enum HexError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte transaction identifier.
///
/// Gateway-side ids are the SHA-256 digest of the raw transaction bytes and
/// are used for response correlation and mempool `has_tx` lookups.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sbor::prelude::BasicSbor)]
pub struct TxId([u8; 32]);

impl TxId {
    /// The all-zero id.
    pub const ZERO: TxId = TxId([0u8; 32]);

    /// Create an id from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the id of a transaction from its raw bytes.
    pub fn digest(tx_bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tx_bytes);
        Self(hasher.finalize().into())
    }

    /// Get the raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse an id from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HexError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Hex-encode the id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl serde::Serialize for TxId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for TxId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
