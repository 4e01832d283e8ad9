//! Periodic presence broadcast

use meshproxy_transport::MeshTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time between announces
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Shorter intervals are raised to this
pub const MIN_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Broadcasts the node's address right away, then every `interval`
pub struct Announcer {
    transport: Arc<dyn MeshTransport>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Announcer {
    pub fn new(transport: Arc<dyn MeshTransport>, interval: Duration) -> Self {
        let interval = if interval < MIN_ANNOUNCE_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                min_secs = MIN_ANNOUNCE_INTERVAL.as_secs(),
                "Announce interval too short, using the minimum"
            );
            MIN_ANNOUNCE_INTERVAL
        } else {
            interval
        };
        Self {
            transport,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the announcer when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn spawn(self) -> AnnouncerHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        AnnouncerHandle { cancel, task }
    }

    async fn run(self) -> u64 {
        let address = self.transport.local_address();
        let mut ticker = tokio::time::interval(self.interval);
        let mut announces = 0u64;

        info!(
            address = %address,
            interval_secs = self.interval.as_secs(),
            "Announcer started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.transport.announce();
                    announces += 1;
                    debug!(address = %address, count = announces, "Announced presence");
                }
            }
        }

        info!(address = %address, announces, "Announcer stopped");
        announces
    }
}

/// Running announcer
pub struct AnnouncerHandle {
    cancel: CancellationToken,
    task: JoinHandle<u64>,
}

impl AnnouncerHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop announcing and return how many announces were made
    pub async fn shutdown(self) -> Result<u64, JoinError> {
        self.cancel.cancel();
        self.task.await.map_err(|error| {
            warn!(error = %error, "Announcer task did not stop cleanly");
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshproxy_transport::{
        DeliveryCallback, InboundHandler, MemoryMesh, MeshConfig, OutboundMessage,
    };
    use meshproxy_types::{DestinationAddress, Identity, LocalIdentity};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingTransport {
        local: LocalIdentity,
        announces: AtomicU64,
    }

    impl MeshTransport for CountingTransport {
        fn local_identity(&self) -> Identity {
            self.local.identity()
        }

        fn recall_identity(&self, _address: &DestinationAddress) -> Option<Identity> {
            None
        }

        fn request_path(&self, _address: &DestinationAddress) {}

        fn send_message(&self, _message: OutboundMessage, _on_status: DeliveryCallback) {}

        fn set_inbound_handler(&self, _handler: InboundHandler) {}

        fn announce(&self) {
            self.announces.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_announces_at_start_then_every_interval() {
        let transport = Arc::new(CountingTransport {
            local: LocalIdentity::generate(),
            announces: AtomicU64::new(0),
        });
        let handle = Announcer::new(transport.clone(), Duration::from_secs(60)).spawn();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.announces.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.announces.load(Ordering::SeqCst), 3);

        assert_eq!(handle.shutdown().await.unwrap(), 3);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.announces.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let transport = Arc::new(CountingTransport {
            local: LocalIdentity::generate(),
            announces: AtomicU64::new(0),
        });
        let announcer = Announcer::new(transport.clone(), Duration::ZERO);
        assert_eq!(announcer.interval(), MIN_ANNOUNCE_INTERVAL);
        let handle = announcer.spawn();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.announces.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.shutdown().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_announcer() {
        let transport = Arc::new(CountingTransport {
            local: LocalIdentity::generate(),
            announces: AtomicU64::new(0),
        });
        let cancel = CancellationToken::new();
        let handle = Announcer::new(transport, DEFAULT_ANNOUNCE_INTERVAL)
            .with_cancellation(cancel.clone())
            .spawn();

        cancel.cancel();
        assert!(handle.cancellation_token().is_cancelled());
        assert!(handle.shutdown().await.unwrap() <= 1);
    }

    #[tokio::test]
    async fn test_first_announce_reaches_peers() {
        let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
        let gateway = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let peer = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let gateway_address = gateway.local_address();

        let handle = Announcer::new(Arc::new(gateway), DEFAULT_ANNOUNCE_INTERVAL).spawn();
        for _ in 0..100 {
            if peer.recall_identity(&gateway_address).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(peer.recall_identity(&gateway_address).is_some());
        assert_eq!(handle.shutdown().await.unwrap(), 1);
    }
}
