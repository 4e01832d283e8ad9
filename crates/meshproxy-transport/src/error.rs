//! Transport error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Address already registered on this mesh: {0}")]
    AddressInUse(String),

    #[error("Failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
