//! Transport contract consumed by the tunnel

use crate::message::{DeliveryCallback, InboundHandler, OutboundMessage};
use meshproxy_types::{DestinationAddress, Identity};

/// Identity-addressed, store-and-forward message transport.
///
/// Every method returns immediately. Discovery, delivery and retries happen
/// in the background; their outcomes come back through the identity cache
/// ([`recall_identity`](Self::recall_identity)), the per-message
/// [`DeliveryCallback`] and the [`InboundHandler`].
pub trait MeshTransport: Send + Sync + 'static {
    /// Public identity of this node
    fn local_identity(&self) -> Identity;

    /// Address other nodes use to reach this node
    fn local_address(&self) -> DestinationAddress {
        self.local_identity().address()
    }

    /// Look up a cached identity without touching the network
    fn recall_identity(&self, address: &DestinationAddress) -> Option<Identity>;

    /// Ask the network for a path to `address`; a successful lookup lands in
    /// the identity cache
    fn request_path(&self, address: &DestinationAddress);

    /// Queue a message for delivery
    fn send_message(&self, message: OutboundMessage, on_status: DeliveryCallback);

    /// Install the handler for inbound messages, replacing any previous one
    fn set_inbound_handler(&self, handler: InboundHandler);

    /// Broadcast this node's identity so peers can cache it
    fn announce(&self);
}
