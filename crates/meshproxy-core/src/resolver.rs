//! Identity resolution
//!
//! The transport keeps an identity cache fed by announces and path
//! responses. Resolution checks that cache, asks the network for a path when
//! the address is unknown, then polls the cache until the identity shows up
//! or the deadline passes. Polling keeps this side ignorant of how the
//! transport discovers paths.

use crate::error::{Result, TunnelError};
use meshproxy_transport::MeshTransport;
use meshproxy_types::{DestinationAddress, Identity};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Interval between cache checks while waiting for a path
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct IdentityResolver {
    transport: Arc<dyn MeshTransport>,
    poll_interval: Duration,
}

impl IdentityResolver {
    pub fn new(transport: Arc<dyn MeshTransport>) -> Self {
        Self {
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resolve `address`, waiting at most `timeout` for discovery
    pub async fn resolve(&self, address: &DestinationAddress, timeout: Duration) -> Result<Identity> {
        if let Some(identity) = self.transport.recall_identity(address) {
            return Ok(identity);
        }

        info!(
            address = %address,
            timeout_secs = timeout.as_secs(),
            "Don't have identity, requesting path"
        );
        self.transport.request_path(address);

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;

            if let Some(identity) = self.transport.recall_identity(address) {
                debug!(address = %address, "Identity resolved");
                return Ok(identity);
            }
        }

        warn!(address = %address, "Cannot recall identity");
        Err(TunnelError::IdentityResolutionTimeout {
            address: *address,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshproxy_transport::{MemoryMesh, MeshConfig};
    use meshproxy_types::LocalIdentity;

    #[tokio::test(start_paused = true)]
    async fn test_cached_identity_returns_immediately() {
        let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
        let client = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let server = mesh.endpoint(LocalIdentity::generate()).unwrap();
        server.announce();

        let resolver = IdentityResolver::new(Arc::new(client));
        let started = Instant::now();
        let identity = resolver
            .resolve(&server.local_address(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(identity, server.local_identity());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_through_path_request() {
        let mesh = MemoryMesh::new(MeshConfig {
            path_latency: Duration::from_millis(2500),
            ..MeshConfig::default()
        })
        .unwrap();
        let client = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let server = mesh.endpoint(LocalIdentity::generate()).unwrap();

        let resolver = IdentityResolver::new(Arc::new(client));
        let started = Instant::now();
        let identity = resolver
            .resolve(&server.local_address(), Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(identity, server.local_identity());
        // Found on the first poll after the path arrived
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_address_times_out() {
        let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
        let client = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let nobody = LocalIdentity::generate().address();

        let resolver = IdentityResolver::new(Arc::new(client));
        let started = Instant::now();
        let err = resolver
            .resolve(&nobody, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TunnelError::IdentityResolutionTimeout { address, .. } if address == nobody
        ));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed <= Duration::from_secs(1) + DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_shorter_than_poll_interval() {
        let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
        let client = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let nobody = LocalIdentity::generate().address();

        let resolver = IdentityResolver::new(Arc::new(client));
        let started = Instant::now();
        assert!(resolver
            .resolve(&nobody, Duration::from_millis(300))
            .await
            .is_err());
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }
}
