//! meshproxy gateway
//!
//! Runs next to a real HTTP service and answers tunneled requests for it:
//! - [`ServerGateway`] - turns inbound request envelopes into origin calls
//!   and relays the bodies back
//! - [`Announcer`] - keeps the gateway discoverable
//! - [`GatewayConfig`] - environment-driven configuration for the binary

pub mod announcer;
pub mod config;
pub mod gateway;

pub use announcer::{Announcer, AnnouncerHandle, DEFAULT_ANNOUNCE_INTERVAL, MIN_ANNOUNCE_INTERVAL};
pub use config::GatewayConfig;
pub use gateway::{
    GatewayError, GatewayOptions, GatewayStats, ServerGateway, CLIENT_VERSION_HEADER,
};
