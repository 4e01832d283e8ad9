//! Tunnel error taxonomy

use meshproxy_types::{DestinationAddress, EnvelopeError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunnelError {
    /// No mapping matched and direct HTTP is disabled
    #[error("URL {0} not found in mappings and direct HTTP is disabled")]
    RouteNotFound(String),

    /// The destination never became routable
    #[error("Cannot recall identity for {address} after {timeout:?}")]
    IdentityResolutionTimeout {
        address: DestinationAddress,
        timeout: Duration,
    },

    /// The transport gave up delivering the request
    #[error("Request failed: {0}")]
    DeliveryFailed(String),

    /// A caller-imposed deadline (or the idle sweep) expired
    #[error("Request {0} timed out")]
    RequestTimeout(String),

    /// The gateway's outbound call failed. Only ever logged on the gateway;
    /// the client sees its own delivery failure or timeout instead.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// A reply came from somewhere other than the request's destination
    #[error("Reply for {req_id} from {actual}, expected {expected}")]
    ProvenanceMismatch {
        req_id: String,
        expected: DestinationAddress,
        actual: DestinationAddress,
    },

    /// A reply for a request that is not pending
    #[error("Reply with unknown req_id {0}")]
    UnknownReply(String),

    #[error("Request ID {0} is already pending")]
    DuplicateRequestId(String),

    #[error("Request correlator has shut down")]
    CorrelatorClosed,

    #[error("No tokio runtime: {0}")]
    NoRuntime(String),

    /// Another component already receives this node's inbound messages
    #[error("Inbound handler for {0} is already installed")]
    InboundHandlerTaken(DestinationAddress),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
