//! Per-node mesh context

use crate::error::{Result, TunnelError};
use crate::resolver::IdentityResolver;
use meshproxy_transport::MeshTransport;
use meshproxy_types::{DestinationAddress, Identity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a tunnel component needs to talk to the mesh.
///
/// One context per local identity; clone it freely. A transport has a single
/// inbound handler, so only one client proxy or gateway can be built on a
/// context (see [`claim_inbound`](Self::claim_inbound)). Wrapping the same
/// transport in two separate contexts bypasses that check.
#[derive(Clone)]
pub struct MeshContext {
    transport: Arc<dyn MeshTransport>,
    resolver: IdentityResolver,
    inbound_claimed: Arc<AtomicBool>,
}

impl MeshContext {
    pub fn new(transport: Arc<dyn MeshTransport>) -> Self {
        let resolver = IdentityResolver::new(transport.clone());
        Self {
            transport,
            resolver,
            inbound_claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_resolver(transport: Arc<dyn MeshTransport>, resolver: IdentityResolver) -> Self {
        Self {
            transport,
            resolver,
            inbound_claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn transport(&self) -> &Arc<dyn MeshTransport> {
        &self.transport
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn local_identity(&self) -> Identity {
        self.transport.local_identity()
    }

    pub fn local_address(&self) -> DestinationAddress {
        self.transport.local_address()
    }

    /// Reserve the transport's inbound handler. Fails if a component built
    /// on this context (or a clone of it) already holds it.
    pub fn claim_inbound(&self) -> Result<()> {
        if self.inbound_claimed.swap(true, Ordering::SeqCst) {
            return Err(TunnelError::InboundHandlerTaken(self.local_address()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshproxy_transport::{MemoryMesh, MeshConfig};
    use meshproxy_types::LocalIdentity;

    #[tokio::test]
    async fn test_inbound_claimed_once_across_clones() {
        let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
        let node = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let ctx = MeshContext::new(Arc::new(node));
        let clone = ctx.clone();

        ctx.claim_inbound().unwrap();
        assert!(matches!(
            clone.claim_inbound(),
            Err(TunnelError::InboundHandlerTaken(address)) if address == ctx.local_address()
        ));
    }
}
