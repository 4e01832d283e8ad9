//! Destination addresses
//!
//! An address is the truncated hash of an identity's public key under the
//! delivery aspect. It is stable for as long as the identity is, and says
//! nothing about where the peer physically is.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Address length in bytes (rendered as twice as many hex characters)
pub const ADDRESS_LEN: usize = 16;

/// Aspect name mixed into the address hash for message delivery
pub const DELIVERY_ASPECT: &str = "lxmf.delivery";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("Address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Opaque, fixed-length destination address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationAddress([u8; ADDRESS_LEN]);

impl DestinationAddress {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive the delivery address for a public key
    pub fn for_public_key(public_key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DELIVERY_ASPECT.as_bytes());
        hasher.update(public_key);
        let digest = hasher.finalize();

        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for DestinationAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim()).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] =
            raw.as_slice()
                .try_into()
                .map_err(|_| AddressParseError::InvalidLength {
                    expected: ADDRESS_LEN,
                    actual: raw.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.to_hex())
    }
}

impl Serialize for DestinationAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DestinationAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
