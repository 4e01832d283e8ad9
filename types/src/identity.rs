//! Identities
//!
//! An [`Identity`] is the public half: what a peer learns about a destination
//! once it has been announced or discovered. A [`LocalIdentity`] holds the
//! signing key for this node and can be persisted between runs.

use crate::address::DestinationAddress;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Identity file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Public identity of a mesh destination
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    public_key: VerifyingKey,
}

impl Identity {
    pub fn from_public_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKey(format!("expected {} bytes", PUBLIC_KEY_LEN)))?;
        let public_key =
            VerifyingKey::from_bytes(&bytes).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Ok(Self { public_key })
    }

    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public_key.to_bytes()
    }

    /// Delivery address this identity is reachable at
    pub fn address(&self) -> DestinationAddress {
        DestinationAddress::for_public_key(&self.public_bytes())
    }

    /// Verify a detached signature made by this identity
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), IdentityError> {
        let bytes: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| {
            IdentityError::InvalidSignature(format!("expected {} bytes", SIGNATURE_LEN))
        })?;
        let signature = Signature::from_bytes(&bytes);
        self.public_key
            .verify(message, &signature)
            .map_err(|e| IdentityError::InvalidSignature(e.to_string()))
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim()).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Self::from_public_bytes(&raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.public_bytes()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address())
            .finish()
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Signing identity owned by this node
#[derive(Clone)]
pub struct LocalIdentity {
    signing_key: SigningKey,
}

impl LocalIdentity {
    /// Fresh random identity
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self::from_secret_bytes(secret)
    }

    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            public_key: self.signing_key.verifying_key(),
        }
    }

    pub fn address(&self) -> DestinationAddress {
        self.identity().address()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Read a hex-encoded secret key from `path`
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let contents = std::fs::read_to_string(path)?;
        let raw =
            hex::decode(contents.trim()).map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        let secret: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidKey("secret key must be 32 bytes".to_string()))?;
        Ok(Self::from_secret_bytes(secret))
    }

    /// Write the secret key to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{}\n", hex::encode(self.signing_key.to_bytes())))?;
        Ok(())
    }

    /// Load the identity at `path`, or create and persist a new one.
    ///
    /// The boolean is `true` when a new identity was written.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool), IdentityError> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }
        let identity = Self::generate();
        identity.save(path)?;
        Ok((identity, true))
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
