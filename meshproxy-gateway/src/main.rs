//! meshproxy gateway - main entry point
//!
//! Exposes an HTTP origin to mesh clients:
//! - Loads (or creates) the gateway's persistent identity
//! - Serves the HTTP mesh transport endpoints
//! - Answers tunneled requests from the origin
//! - Announces itself periodically

use anyhow::Context;
use clap::Parser;
use meshproxy_core::MeshContext;
use meshproxy_gateway::{Announcer, GatewayConfig, ServerGateway};
use meshproxy_transport::{HttpTransport, MeshTransport};
use meshproxy_types::LocalIdentity;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line overrides for the environment configuration
#[derive(Parser, Debug)]
#[command(name = "meshproxy-gateway")]
#[command(version, about = "Answer tunneled HTTP requests from a real origin", long_about = None)]
struct Args {
    /// Origin base URL [env: MESHPROXY_ORIGIN_URL]
    #[arg(long)]
    origin: Option<String>,

    /// Identity name under ~/.meshproxy [env: MESHPROXY_IDENTITY_NAME]
    #[arg(long)]
    identity_name: Option<String>,

    /// Mesh listen address [env: MESHPROXY_LISTEN_ADDR]
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Public URL of this node [env: MESHPROXY_PUBLIC_URL]
    #[arg(long)]
    public_url: Option<String>,

    /// Seed peer URL, repeatable [env: MESHPROXY_PEERS]
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Seconds between announces [env: MESHPROXY_ANNOUNCE_INTERVAL_SECS]
    #[arg(long)]
    announce_interval: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut GatewayConfig) {
        if let Some(origin) = self.origin {
            config.origin_url = origin;
        }
        if let Some(name) = self.identity_name {
            config.identity_name = name;
        }
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if self.public_url.is_some() {
            config.public_url = self.public_url;
        }
        if !self.peers.is_empty() {
            config.peers = self.peers;
        }
        if let Some(secs) = self.announce_interval {
            config.announce_interval = Duration::from_secs(secs);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let mut config = GatewayConfig::from_env()?;
    Args::parse().apply(&mut config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    let identity_path = config.identity_path()?;
    let (local, created) = LocalIdentity::load_or_create(&identity_path)
        .with_context(|| format!("Failed to load identity from {}", identity_path.display()))?;
    if created {
        info!("Created new identity at {}", identity_path.display());
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              meshproxy Gateway Starting                    ║");
    info!("╠════════════════════════════════════════════════════════════╣");
    info!("║  Address:     {:^44} ║", local.address().to_string());
    info!("║  Origin:      {:^44} ║", config.origin_url);
    info!("║  Listen:      {:^44} ║", config.listen_addr);
    info!("║  Peers:       {:^44} ║", config.peers.len());
    info!("║  Announce:    {:^44} ║", format!("every {}s", config.announce_interval.as_secs()));
    info!("╚════════════════════════════════════════════════════════════╝");

    let transport = HttpTransport::bind(config.transport_config(), local)
        .await
        .context("Failed to start mesh transport")?;
    let transport: Arc<dyn MeshTransport> = Arc::new(transport);

    let gateway = ServerGateway::start(MeshContext::new(transport.clone()), config.gateway_options())?;
    let announcer = Announcer::new(transport, config.announce_interval).spawn();

    info!("✓ Gateway ready, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    let announces = announcer
        .shutdown()
        .await
        .context("Announcer task failed")?;
    let stats = gateway.stats();
    info!(
        received = stats.received,
        replied = stats.replied,
        dropped = stats.dropped,
        announces,
        "Gateway stopped"
    );

    Ok(())
}
