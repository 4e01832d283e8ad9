//! Messages exchanged with a transport

use meshproxy_types::{DestinationAddress, Fields, Identity};
use std::sync::Arc;

/// Message handed to [`MeshTransport::send_message`](crate::MeshTransport::send_message)
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub destination: Identity,
    pub title: String,
    pub content: String,
    pub fields: Fields,
}

impl OutboundMessage {
    pub fn new(destination: Identity, content: impl Into<String>, fields: Fields) -> Self {
        Self {
            destination,
            title: String::new(),
            content: content.into(),
            fields,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Message delivered to the local node.
///
/// `source` is authenticated by the transport: a message can only carry the
/// address of the identity that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub source: DestinationAddress,
    pub destination: DestinationAddress,
    pub title: String,
    pub content: String,
    pub fields: Fields,
}

/// Terminal delivery outcome of an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Transport-level acknowledgement from the destination
    Delivered,
    /// The transport gave up on the message
    Failed { reason: String },
}

/// Invoked exactly once per outbound message, from a transport-owned context
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryStatus) + Send + 'static>;

/// Invoked for every message addressed to the local identity
pub type InboundHandler = Arc<dyn Fn(InboundMessage) + Send + Sync + 'static>;
