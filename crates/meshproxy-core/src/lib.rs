//! meshproxy core
//!
//! The pieces of the tunnel shared by both ends:
//! - [`IdentityResolver`] - turns a destination address into a routable
//!   identity by polling the transport's cache
//! - [`RequestCorrelator`] - matches replies to outstanding requests and
//!   checks where each reply came from
//! - [`MeshContext`] - the explicit per-node context handed to the client
//!   proxy and the gateway
//! - [`outbound`] - real HTTP calls built from envelope fields

pub mod context;
pub mod correlator;
pub mod error;
pub mod outbound;
pub mod resolver;

pub use context::MeshContext;
pub use correlator::{PendingReply, ReplyResult, RequestCorrelator, RequestState};
pub use error::{Result, TunnelError};
pub use outbound::{OriginRequest, OriginResponse};
pub use resolver::{IdentityResolver, DEFAULT_POLL_INTERVAL};
