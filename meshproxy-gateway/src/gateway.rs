//! Reverse-proxy gateway
//!
//! Every inbound envelope runs on its own task:
//!
//! ```text
//!  inbound ──▶ req_id? ──▶ method? ──▶ resolve sender ──▶ origin call ──▶ reply "ACK"
//!                │            │               │                │
//!                └────────────┴───── drop ────┴────────────────┘
//! ```
//!
//! Failures are logged and the envelope is dropped. Nothing is ever sent
//! back for a failed request; the client finds out through its own deadline.

use meshproxy_core::outbound::{self, OriginRequest};
use meshproxy_core::{MeshContext, TunnelError};
use meshproxy_transport::{DeliveryStatus, InboundMessage, OutboundMessage};
use meshproxy_types::{ReplyEnvelope, ReqId, RequestEnvelope, REPLY_TITLE};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Header added to every origin call unless the envelope sets it
pub const CLIENT_VERSION_HEADER: &str = "Client-version";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No tokio runtime: {0}")]
    NoRuntime(String),

    #[error("Invalid origin URL: {0}")]
    InvalidOrigin(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Mesh(#[from] TunnelError),
}

/// Gateway behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Base URL the envelope target is appended to
    pub origin_url: String,

    /// How long to wait for the sender's reply path
    pub resolve_timeout: Duration,

    /// Deadline for the origin call
    pub http_timeout: Duration,
}

impl GatewayOptions {
    pub fn new(origin_url: impl Into<String>) -> Self {
        Self {
            origin_url: origin_url.into(),
            resolve_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(5),
        }
    }
}

/// Gateway counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub received: u64,
    pub replied: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    replied: AtomicU64,
    dropped: AtomicU64,
}

struct GatewayInner {
    ctx: MeshContext,
    http: reqwest::Client,
    options: GatewayOptions,
    counters: Counters,
}

/// Answers tunneled requests by calling the origin
#[derive(Clone)]
pub struct ServerGateway {
    inner: Arc<GatewayInner>,
}

impl ServerGateway {
    /// Build the gateway and install it as the transport's inbound handler
    pub fn start(ctx: MeshContext, options: GatewayOptions) -> Result<Self, GatewayError> {
        let runtime = Handle::try_current().map_err(|e| GatewayError::NoRuntime(e.to_string()))?;
        if !(options.origin_url.starts_with("http://") || options.origin_url.starts_with("https://")) {
            return Err(GatewayError::InvalidOrigin(options.origin_url));
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            HeaderName::from_static("client-version"),
            HeaderValue::from_static(concat!("meshproxy/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| GatewayError::HttpClient(e.to_string()))?;

        ctx.claim_inbound()?;
        let gateway = Self {
            inner: Arc::new(GatewayInner {
                ctx,
                http,
                options,
                counters: Counters::default(),
            }),
        };

        let handler = gateway.clone();
        gateway
            .inner
            .ctx
            .transport()
            .set_inbound_handler(Arc::new(move |message: InboundMessage| {
                let gateway = handler.clone();
                runtime.spawn(async move { gateway.handle(message).await });
            }));

        info!(
            address = %gateway.inner.ctx.local_address(),
            origin = %gateway.inner.options.origin_url,
            "Gateway serving origin"
        );
        Ok(gateway)
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.inner.options
    }

    pub fn stats(&self) -> GatewayStats {
        let counters = &self.inner.counters;
        GatewayStats {
            received: counters.received.load(Ordering::Relaxed),
            replied: counters.replied.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    async fn handle(&self, message: InboundMessage) {
        let counters = &self.inner.counters;
        counters.received.fetch_add(1, Ordering::Relaxed);

        let source = message.source;
        let description = message.fields.describe();
        match self.process(message).await {
            Ok(req_id) => {
                counters.replied.fetch_add(1, Ordering::Relaxed);
                debug!(req_id = %req_id, "Reply handed to transport");
            }
            Err(e) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(source = %source, error = %e, "Dropping {}", description);
            }
        }
    }

    /// Answer one inbound envelope. Returns the request token once the reply
    /// is on its way; on error nothing was sent.
    pub async fn process(&self, message: InboundMessage) -> Result<ReqId, TunnelError> {
        let inner = &self.inner;
        let envelope = RequestEnvelope::from_parts(message.content, message.fields)?;
        let req_id = envelope.req_id.clone();
        info!(
            req_id = %req_id,
            source = %message.source,
            method = %envelope.method,
            target = %envelope.target,
            "Received request"
        );

        let sender = inner
            .ctx
            .resolver()
            .resolve(&message.source, inner.options.resolve_timeout)
            .await?;

        let request = OriginRequest::from_envelope(&inner.options.origin_url, envelope);
        let url = request.url.clone();
        let response = outbound::execute(&inner.http, request, Some(inner.options.http_timeout)).await?;
        if !response.is_success() {
            return Err(TunnelError::RemoteUnavailable(format!(
                "{} answered {}",
                url, response.status
            )));
        }
        debug!(req_id = %req_id, status = response.status, bytes = response.body.len(), "Origin answered");

        let (content, fields) = ReplyEnvelope::new(req_id.clone(), response.body).into_parts();
        let logged = req_id.clone();
        inner.ctx.transport().send_message(
            OutboundMessage::new(sender, content, fields).with_title(REPLY_TITLE),
            Box::new(move |status| match status {
                DeliveryStatus::Delivered => debug!(req_id = %logged, "Reply delivered"),
                DeliveryStatus::Failed { reason } => {
                    warn!(req_id = %logged, reason = %reason, "Reply delivery failed")
                }
            }),
        );

        Ok(req_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshproxy_transport::{MemoryMesh, MeshConfig};
    use meshproxy_types::LocalIdentity;

    #[tokio::test]
    async fn test_rejects_non_http_origin() {
        let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
        let node = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let ctx = MeshContext::new(Arc::new(node));

        let result = ServerGateway::start(ctx, GatewayOptions::new("ftp://origin/"));
        assert!(matches!(result, Err(GatewayError::InvalidOrigin(_))));
    }

    #[test]
    fn test_start_requires_runtime() {
        // Build the context inside a runtime, then leave it
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let node = runtime.block_on(async {
            let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
            mesh.endpoint(LocalIdentity::generate()).unwrap()
        });
        let ctx = MeshContext::new(Arc::new(node));

        let result = ServerGateway::start(ctx, GatewayOptions::new("http://origin/"));
        assert!(matches!(result, Err(GatewayError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_second_component_on_context_rejected() {
        let mesh = MemoryMesh::new(MeshConfig::default()).unwrap();
        let node = mesh.endpoint(LocalIdentity::generate()).unwrap();
        let ctx = MeshContext::new(Arc::new(node));

        let _gateway = ServerGateway::start(ctx.clone(), GatewayOptions::new("http://origin/")).unwrap();
        let result = ServerGateway::start(ctx, GatewayOptions::new("http://origin/"));
        assert!(matches!(
            result,
            Err(GatewayError::Mesh(TunnelError::InboundHandlerTaken(_)))
        ));
    }

    #[test]
    fn test_default_options() {
        let options = GatewayOptions::new("http://127.0.0.1:3338/");
        assert_eq!(options.resolve_timeout, Duration::from_secs(30));
        assert_eq!(options.http_timeout, Duration::from_secs(5));
    }
}
