//! meshproxy transport layer
//!
//! The tunnel treats the mesh as a black box reachable through
//! [`MeshTransport`]. Two implementations ship with this crate:
//!
//! - [`memory::MemoryMesh`] - a process-local mesh with configurable latency,
//!   partitions and duplicate delivery, used by tests and demos
//! - [`http::HttpTransport`] - signed frames over plain HTTP between nodes
//!   that know each other through announces and path lookups
//!
//! Callbacks handed to a transport run on the transport's own tasks, never on
//! the caller's. Anything they touch must be safe to hand across contexts.

pub mod error;
pub mod memory;
pub mod message;
pub mod traits;

#[cfg(feature = "http")]
pub mod http;

pub use error::{Result, TransportError};
pub use memory::{MemoryMesh, MemoryTransport, MeshConfig, SentMessage};
pub use message::{
    DeliveryCallback, DeliveryStatus, InboundHandler, InboundMessage, OutboundMessage,
};
pub use traits::MeshTransport;

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportConfig};
