//! Wire types for the HTTP mesh transport

use crate::error::{Result, TransportError};
use meshproxy_types::{DestinationAddress, Fields, Identity, LocalIdentity};
use serde::{Deserialize, Serialize};

/// Message body covered by the sender's signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    pub source: DestinationAddress,
    pub destination: DestinationAddress,
    pub title: String,
    pub content: String,
    pub fields: Fields,
    pub timestamp: u64,
}

/// A payload plus the identity and signature that authenticate its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedFrame {
    pub source_identity: Identity,
    /// JSON-encoded [`FramePayload`], signed byte for byte
    pub payload: String,
    /// Hex-encoded ed25519 signature over `payload`
    pub signature: String,
}

impl SignedFrame {
    pub fn seal(local: &LocalIdentity, payload: &FramePayload) -> Result<Self> {
        let payload = serde_json::to_string(payload)?;
        let signature = hex::encode(local.sign(payload.as_bytes()));
        Ok(Self {
            source_identity: local.identity(),
            payload,
            signature,
        })
    }

    /// Verify the signature and that the claimed source belongs to the
    /// signing identity, then decode the payload
    pub fn open(&self) -> Result<FramePayload> {
        let signature = hex::decode(&self.signature)
            .map_err(|e| TransportError::InvalidFrame(format!("signature: {}", e)))?;
        self.source_identity
            .verify(self.payload.as_bytes(), &signature)
            .map_err(|e| TransportError::InvalidFrame(e.to_string()))?;

        let payload: FramePayload = serde_json::from_str(&self.payload)?;
        if payload.source != self.source_identity.address() {
            return Err(TransportError::InvalidFrame(format!(
                "source {} does not belong to signing identity {}",
                payload.source,
                self.source_identity.address()
            )));
        }
        Ok(payload)
    }
}

/// Signed statement that an identity is reachable at a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceRecord {
    pub identity: Identity,
    pub url: String,
    pub timestamp: u64,
    pub signature: String,
}

impl AnnounceRecord {
    pub fn new(local: &LocalIdentity, url: impl Into<String>) -> Self {
        let mut record = Self {
            identity: local.identity(),
            url: url.into(),
            timestamp: current_timestamp_millis(),
            signature: String::new(),
        };
        record.signature = hex::encode(local.sign(&record.signing_bytes()));
        record
    }

    pub fn address(&self) -> DestinationAddress {
        self.identity.address()
    }

    pub fn verify(&self) -> Result<()> {
        let signature = hex::decode(&self.signature)
            .map_err(|e| TransportError::InvalidFrame(format!("signature: {}", e)))?;
        self.identity
            .verify(&self.signing_bytes(), &signature)
            .map_err(|e| TransportError::InvalidFrame(e.to_string()))
    }

    fn signing_bytes(&self) -> Vec<u8> {
        format!("announce|{}|{}|{}", self.identity, self.url, self.timestamp).into_bytes()
    }
}

/// Helper to get current timestamp in milliseconds
#[inline]
pub fn current_timestamp_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
