//! HTTP mesh transport handle

use super::server::{create_router, TransportState};
use super::types::{current_timestamp_millis, AnnounceRecord, FramePayload, SignedFrame};
use crate::error::{Result, TransportError};
use crate::message::{DeliveryCallback, DeliveryStatus, InboundHandler, OutboundMessage};
use crate::traits::MeshTransport;
use meshproxy_types::{DestinationAddress, Identity, LocalIdentity};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Address the mesh endpoints listen on
    pub listen_addr: SocketAddr,
    /// URL peers use to reach this node (defaults to `http://<bound addr>`)
    pub public_url: Option<String>,
    /// Nodes that receive our announces and answer path requests
    pub seed_peers: Vec<String>,
    /// Delivery attempts before the failure callback fires
    pub max_attempts: u32,
    /// Backoff step between attempts (grows linearly)
    pub retry_backoff: Duration,
    /// Per-request timeout for node-to-node calls
    pub request_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 4242)),
            public_url: None,
            seed_peers: Vec::new(),
            max_attempts: 5,
            retry_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Mesh transport over HTTP
pub struct HttpTransport {
    state: Arc<TransportState>,
    client: reqwest::Client,
    config: HttpTransportConfig,
    runtime: Handle,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
}

impl HttpTransport {
    /// Bind the mesh endpoints and start serving them
    pub async fn bind(config: HttpTransportConfig, local: LocalIdentity) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let public_url = config
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", local_addr));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let state = Arc::new(TransportState::new(local, public_url));
        let app = create_router(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Mesh HTTP server stopped: {}", e);
            }
        });

        info!(
            address = %state.local.address(),
            listen = %local_addr,
            url = %state.public_url,
            seeds = config.seed_peers.len(),
            "HTTP mesh transport started"
        );

        Ok(Self {
            state,
            client,
            config,
            runtime: Handle::current(),
            local_addr,
            server,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn public_url(&self) -> &str {
        &self.state.public_url
    }

    /// Signed record describing this node
    pub fn announce_record(&self) -> AnnounceRecord {
        self.state.own_record()
    }

    /// Cache a peer record obtained out of band
    pub fn add_peer(&self, record: AnnounceRecord) -> Result<()> {
        record.verify()?;
        self.state.remember(record);
        Ok(())
    }

    fn announce_targets(&self) -> Vec<String> {
        let mut targets = self.config.seed_peers.clone();
        for peer in self.state.peers.iter() {
            if !targets.contains(&peer.url) {
                targets.push(peer.url.clone());
            }
        }
        targets
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

impl MeshTransport for HttpTransport {
    fn local_identity(&self) -> Identity {
        self.state.local.identity()
    }

    fn recall_identity(&self, address: &DestinationAddress) -> Option<Identity> {
        if *address == self.state.local.address() {
            return Some(self.state.local.identity());
        }
        self.state.peers.get(address).map(|record| record.identity)
    }

    fn request_path(&self, address: &DestinationAddress) {
        let address = *address;
        let seeds = self.config.seed_peers.clone();
        let client = self.client.clone();
        let state = self.state.clone();

        self.runtime.spawn(async move {
            for seed in seeds {
                let url = endpoint(&seed, &format!("/mesh/path/{}", address));
                let record = match client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => resp.json::<AnnounceRecord>().await,
                    Ok(resp) => {
                        debug!(seed = %seed, status = %resp.status(), "Seed has no path");
                        continue;
                    }
                    Err(e) => {
                        debug!(seed = %seed, "Path request failed: {}", e);
                        continue;
                    }
                };

                match record {
                    Ok(record) if record.address() == address && record.verify().is_ok() => {
                        debug!(address = %address, seed = %seed, "Path learned from seed");
                        state.remember(record);
                        return;
                    }
                    Ok(_) => warn!(seed = %seed, "Seed returned a record for the wrong identity"),
                    Err(e) => warn!(seed = %seed, "Malformed path response: {}", e),
                }
            }
        });
    }

    fn send_message(&self, message: OutboundMessage, on_status: DeliveryCallback) {
        let destination = message.destination.address();
        let url = self
            .state
            .peers
            .get(&destination)
            .map(|record| endpoint(&record.url, "/mesh/deliver"));

        let payload = FramePayload {
            source: self.state.local.address(),
            destination,
            title: message.title,
            content: message.content,
            fields: message.fields,
            timestamp: current_timestamp_millis(),
        };
        let frame = SignedFrame::seal(&self.state.local, &payload);

        let client = self.client.clone();
        let max_attempts = self.config.max_attempts.max(1);
        let backoff = self.config.retry_backoff;

        self.runtime.spawn(async move {
            let (url, frame) = match (url, frame) {
                (Some(url), Ok(frame)) => (url, frame),
                (None, _) => {
                    on_status(DeliveryStatus::Failed {
                        reason: format!("no path to {}", destination),
                    });
                    return;
                }
                (_, Err(e)) => {
                    on_status(DeliveryStatus::Failed {
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            let mut last_error = String::new();
            for attempt in 1..=max_attempts {
                match client.post(&url).json(&frame).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(destination = %destination, attempt, "Frame delivered");
                        on_status(DeliveryStatus::Delivered);
                        return;
                    }
                    Ok(resp) => last_error = format!("peer answered {}", resp.status()),
                    Err(e) => last_error = e.to_string(),
                }
                debug!(
                    destination = %destination,
                    attempt,
                    max_attempts,
                    error = %last_error,
                    "Delivery attempt failed"
                );
                if attempt < max_attempts {
                    tokio::time::sleep(backoff * attempt).await;
                }
            }

            on_status(DeliveryStatus::Failed { reason: last_error });
        });
    }

    fn set_inbound_handler(&self, handler: InboundHandler) {
        *self.state.inbound.write() = Some(handler);
    }

    fn announce(&self) {
        let record = self.state.own_record();
        let targets = self.announce_targets();
        let client = self.client.clone();

        self.runtime.spawn(async move {
            for target in targets {
                let url = endpoint(&target, "/mesh/announce");
                match client.post(&url).json(&record).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(target = %target, "Announce accepted");
                    }
                    Ok(resp) => warn!(target = %target, status = %resp.status(), "Announce rejected"),
                    Err(e) => warn!(target = %target, "Announce failed: {}", e),
                }
            }
        });
    }
}
