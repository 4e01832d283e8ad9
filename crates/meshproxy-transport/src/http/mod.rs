//! HTTP mesh transport
//!
//! Nodes exchange signed frames over plain HTTP:
//!
//! ```text
//! POST /mesh/deliver          SignedFrame      -> 202 | 400 | 404
//! POST /mesh/announce         AnnounceRecord   -> 204 | 400
//! GET  /mesh/path/:address                     -> AnnounceRecord | 404
//! ```
//!
//! Peers learn each other's identity and URL from announces. Seed peers act
//! as the "network" for announces and path requests.

pub mod client;
mod server;
pub mod types;

pub use client::{HttpTransport, HttpTransportConfig};
pub use types::{AnnounceRecord, FramePayload, SignedFrame};
