//! In-memory mesh
//!
//! A single [`MemoryMesh`] hub connects any number of [`MemoryTransport`]
//! endpoints inside one process. Discovery and delivery run on spawned tasks
//! after a configurable latency, so callbacks always arrive from a different
//! context than the caller's, exactly as they would from a real mesh.

use crate::error::{Result, TransportError};
use crate::message::{
    DeliveryCallback, DeliveryStatus, InboundHandler, InboundMessage, OutboundMessage,
};
use crate::traits::MeshTransport;
use meshproxy_types::{DestinationAddress, Fields, Identity, LocalIdentity};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// Behaviour knobs for a [`MemoryMesh`]
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Delay between `send_message` and delivery
    pub delivery_latency: Duration,
    /// Delay between `request_path` and the identity appearing in the cache
    pub path_latency: Duration,
    /// Deliver every message twice (the ack still fires once)
    pub duplicate_deliveries: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            delivery_latency: Duration::from_millis(10),
            path_latency: Duration::from_millis(50),
            duplicate_deliveries: false,
        }
    }
}

/// Record of a message accepted by the mesh, for inspection in tests
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub source: DestinationAddress,
    pub destination: DestinationAddress,
    pub title: String,
    pub content: String,
    pub fields: Fields,
}

struct Endpoint {
    identity: Identity,
    online: bool,
    handler: Option<InboundHandler>,
    known: HashMap<DestinationAddress, Identity>,
}

#[derive(Default)]
struct MeshState {
    endpoints: HashMap<DestinationAddress, Endpoint>,
    sent: Vec<SentMessage>,
}

struct MeshInner {
    config: MeshConfig,
    state: Mutex<MeshState>,
    runtime: Handle,
}

/// Process-local mesh hub
#[derive(Clone)]
pub struct MemoryMesh {
    inner: Arc<MeshInner>,
}

impl MemoryMesh {
    /// Create a mesh bound to the current tokio runtime
    pub fn new(config: MeshConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(MeshInner {
                config,
                state: Mutex::new(MeshState::default()),
                runtime,
            }),
        })
    }

    /// Attach a node to the mesh
    pub fn endpoint(&self, local: LocalIdentity) -> Result<MemoryTransport> {
        let address = local.address();
        let mut state = self.inner.state.lock();
        if state.endpoints.contains_key(&address) {
            return Err(TransportError::AddressInUse(address.to_string()));
        }
        state.endpoints.insert(
            address,
            Endpoint {
                identity: local.identity(),
                online: true,
                handler: None,
                known: HashMap::new(),
            },
        );
        debug!(address = %address, "Endpoint joined memory mesh");

        Ok(MemoryTransport {
            mesh: self.clone(),
            local,
        })
    }

    /// Take a node off the mesh (or bring it back). Messages to or from an
    /// offline node fail, and it neither answers path requests nor hears
    /// announces.
    pub fn set_online(&self, address: &DestinationAddress, online: bool) {
        if let Some(endpoint) = self.inner.state.lock().endpoints.get_mut(address) {
            endpoint.online = online;
        }
    }

    /// Seed `at`'s identity cache with `identity`
    pub fn learn(&self, at: &DestinationAddress, identity: Identity) {
        if let Some(endpoint) = self.inner.state.lock().endpoints.get_mut(at) {
            endpoint.known.insert(identity.address(), identity);
        }
    }

    /// Hand `message` straight to its destination's inbound handler,
    /// bypassing the sender checks. Used to simulate stray or replayed
    /// traffic.
    pub fn inject(&self, message: InboundMessage) {
        let handler = self
            .inner
            .state
            .lock()
            .endpoints
            .get(&message.destination)
            .and_then(|endpoint| endpoint.handler.clone());
        if let Some(handler) = handler {
            self.inner.runtime.spawn(async move { handler(message) });
        }
    }

    /// Every message accepted by `send_message`, in send order
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.inner.state.lock().sent.clone()
    }

    fn recall(&self, at: &DestinationAddress, address: &DestinationAddress) -> Option<Identity> {
        let state = self.inner.state.lock();
        let endpoint = state.endpoints.get(at)?;
        if at == address {
            return Some(endpoint.identity);
        }
        endpoint.known.get(address).copied()
    }

    fn set_handler(&self, at: &DestinationAddress, handler: InboundHandler) {
        if let Some(endpoint) = self.inner.state.lock().endpoints.get_mut(at) {
            endpoint.handler = Some(handler);
        }
    }

    fn request_path(&self, from: DestinationAddress, target: DestinationAddress) {
        let mesh = self.clone();
        let latency = self.inner.config.path_latency;
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(latency).await;
            let mut state = mesh.inner.state.lock();
            let found = state
                .endpoints
                .get(&target)
                .filter(|endpoint| endpoint.online)
                .map(|endpoint| endpoint.identity);
            match (found, state.endpoints.get_mut(&from)) {
                (Some(identity), Some(requester)) if requester.online => {
                    trace!(from = %from, target = %target, "Path resolved");
                    requester.known.insert(target, identity);
                }
                _ => trace!(from = %from, target = %target, "Path request unanswered"),
            }
        });
    }

    fn announce(&self, from: DestinationAddress) {
        let mut state = self.inner.state.lock();
        let identity = match state.endpoints.get(&from) {
            Some(endpoint) if endpoint.online => endpoint.identity,
            _ => return,
        };
        for (address, endpoint) in state.endpoints.iter_mut() {
            if *address != from && endpoint.online {
                endpoint.known.insert(from, identity);
            }
        }
        debug!(address = %from, "Announce propagated");
    }

    fn send(&self, source: DestinationAddress, message: OutboundMessage, on_status: DeliveryCallback) {
        let destination = message.destination.address();
        self.inner.state.lock().sent.push(SentMessage {
            source,
            destination,
            title: message.title.clone(),
            content: message.content.clone(),
            fields: message.fields.clone(),
        });

        let mesh = self.clone();
        let latency = self.inner.config.delivery_latency;
        let duplicate = self.inner.config.duplicate_deliveries;
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(latency).await;

            let route = {
                let state = mesh.inner.state.lock();
                let source_online = state
                    .endpoints
                    .get(&source)
                    .map(|endpoint| endpoint.online)
                    .unwrap_or(false);
                match state.endpoints.get(&destination) {
                    _ if !source_online => Err("source offline".to_string()),
                    Some(endpoint) if endpoint.online => Ok(endpoint.handler.clone()),
                    Some(_) => Err("destination offline".to_string()),
                    None => Err("destination unknown".to_string()),
                }
            };

            match route {
                Ok(handler) => {
                    let inbound = InboundMessage {
                        source,
                        destination,
                        title: message.title,
                        content: message.content,
                        fields: message.fields,
                    };
                    if let Some(handler) = handler {
                        if duplicate {
                            handler(inbound.clone());
                        }
                        handler(inbound);
                    }
                    on_status(DeliveryStatus::Delivered);
                }
                Err(reason) => {
                    debug!(source = %source, destination = %destination, reason = %reason, "Delivery failed");
                    on_status(DeliveryStatus::Failed { reason });
                }
            }
        });
    }
}

/// One node's handle onto a [`MemoryMesh`]
#[derive(Clone)]
pub struct MemoryTransport {
    mesh: MemoryMesh,
    local: LocalIdentity,
}

impl MemoryTransport {
    pub fn mesh(&self) -> &MemoryMesh {
        &self.mesh
    }
}

impl MeshTransport for MemoryTransport {
    fn local_identity(&self) -> Identity {
        self.local.identity()
    }

    fn recall_identity(&self, address: &DestinationAddress) -> Option<Identity> {
        self.mesh.recall(&self.local.address(), address)
    }

    fn request_path(&self, address: &DestinationAddress) {
        self.mesh.request_path(self.local.address(), *address);
    }

    fn send_message(&self, message: OutboundMessage, on_status: DeliveryCallback) {
        self.mesh.send(self.local.address(), message, on_status);
    }

    fn set_inbound_handler(&self, handler: InboundHandler) {
        self.mesh.set_handler(&self.local.address(), handler);
    }

    fn announce(&self) {
        self.mesh.announce(self.local.address());
    }
}
