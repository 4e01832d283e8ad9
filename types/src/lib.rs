//! meshproxy shared types
//!
//! Everything that crosses a crate boundary lives here:
//! - `address` - fixed-length destination addresses
//! - `identity` - public identities and local signing identities
//! - `envelope` - request/reply envelopes and their wire field map

// ========== Core Modules ==========
pub mod address;
pub mod envelope;
pub mod identity;

pub use address::{AddressParseError, DestinationAddress, ADDRESS_LEN, DELIVERY_ASPECT};
pub use envelope::{
    EnvelopeError, Fields, Method, ReplyEnvelope, ReqId, RequestEnvelope, REPLY_TITLE,
    REQ_ID_LEN,
};
pub use identity::{Identity, IdentityError, LocalIdentity};
