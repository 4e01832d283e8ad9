//! Client facade
//!
//! ```text
//!  get(url) ──▶ MappingTable ──no match──▶ direct HTTP (if allowed) / RouteNotFound
//!                    │
//!                    ▼ (destination, target)
//!              IdentityResolver ──timeout──▶ IdentityResolutionTimeout
//!                    │
//!                    ▼
//!              RequestCorrelator.register ──▶ send_message ──▶ mesh
//!                    │                              │
//!                    │          delivery failed ◀───┘
//!                    ▼
//!              await reply (optional deadline) ──▶ ProxyResponse
//! ```

use crate::mapping::MappingTable;
use crate::response::ProxyResponse;
use meshproxy_core::outbound::{self, OriginRequest};
use meshproxy_core::{MeshContext, RequestCorrelator, Result, TunnelError};
use meshproxy_transport::{DeliveryStatus, InboundMessage, OutboundMessage};
use meshproxy_types::{Method, ReplyEnvelope, ReqId, RequestEnvelope};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Behaviour of a [`ClientProxy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyOptions {
    /// Fall back to a plain HTTP call for URLs no mapping matches
    pub allow_direct_http: bool,

    /// How long to wait for an unknown gateway to become routable
    pub resolve_timeout: Duration,

    /// Default deadline for a reply, overridable per call
    pub request_timeout: Option<Duration>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            allow_direct_http: false,
            resolve_timeout: Duration::from_secs(300),
            request_timeout: None,
        }
    }
}

struct ProxyInner {
    ctx: MeshContext,
    mappings: MappingTable,
    correlator: RequestCorrelator,
    direct: Option<reqwest::Client>,
    options: ProxyOptions,
}

/// HTTP-shaped client that tunnels mapped URLs over the mesh.
///
/// Installs itself as the transport's inbound handler, so a context can
/// carry only one proxy (or gateway).
#[derive(Clone)]
pub struct ClientProxy {
    inner: Arc<ProxyInner>,
}

impl ClientProxy {
    /// Must be called from within a tokio runtime
    pub fn new(ctx: MeshContext, mappings: MappingTable, options: ProxyOptions) -> Result<Self> {
        let direct = if options.allow_direct_http {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| TunnelError::Http(e.to_string()))?;
            Some(client)
        } else {
            None
        };

        let correlator = RequestCorrelator::new()?;
        ctx.claim_inbound()?;
        let replies = correlator.clone();
        ctx.transport()
            .set_inbound_handler(Arc::new(move |message: InboundMessage| {
                handle_reply(&replies, message)
            }));

        info!(
            address = %ctx.local_address(),
            mappings = mappings.len(),
            direct_http = options.allow_direct_http,
            "Client proxy ready"
        );

        Ok(Self {
            inner: Arc::new(ProxyInner {
                ctx,
                mappings,
                correlator,
                direct,
                options,
            }),
        })
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Get, url.into())
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Post, url.into())
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.inner.mappings
    }

    pub fn context(&self) -> &MeshContext {
        &self.inner.ctx
    }

    /// Requests still waiting for a reply
    pub async fn pending_requests(&self) -> Result<usize> {
        self.inner.correlator.pending_count().await
    }

    async fn execute(&self, call: RequestBuilder<'_>) -> Result<ProxyResponse> {
        let inner = &self.inner;
        let Some(route) = inner.mappings.route(&call.url) else {
            return self.fetch_direct(call).await;
        };

        let identity = inner
            .ctx
            .resolver()
            .resolve(&route.destination, inner.options.resolve_timeout)
            .await?;

        let pending = inner
            .correlator
            .register(call.req_id, route.destination)
            .await?;
        let req_id = pending.req_id().clone();

        let envelope = RequestEnvelope {
            req_id: req_id.clone(),
            method: call.method,
            target: route.target,
            params: call.params,
            headers: call.headers,
            cookies: call.cookies,
            data: call.data,
            json: call.json,
        };
        let (content, fields) = envelope.into_parts();
        let description = fields.describe();

        info!(
            req_id = %req_id,
            destination = %route.destination,
            "Sending {}",
            description
        );

        let correlator = inner.correlator.clone();
        let acked = req_id.clone();
        inner.ctx.transport().send_message(
            OutboundMessage::new(identity, content, fields),
            Box::new(move |status| match status {
                DeliveryStatus::Delivered => {
                    debug!("{} delivered", description);
                    correlator.mark_delivered(acked);
                }
                DeliveryStatus::Failed { reason } => {
                    warn!(reason = %reason, "{} failed", description);
                    correlator.fail(
                        acked,
                        TunnelError::DeliveryFailed(format!("{} ({})", description, reason)),
                    );
                }
            }),
        );

        let reply = match call.timeout.or(inner.options.request_timeout) {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(outcome) => outcome?,
                Err(_) => {
                    inner.correlator.withdraw(req_id.clone());
                    warn!(req_id = %req_id, timeout_ms = limit.as_millis() as u64, "Request timed out");
                    return Err(TunnelError::RequestTimeout(req_id.to_string()));
                }
            },
            None => pending.await?,
        };

        debug!(req_id = %req_id, bytes = reply.body.len(), "Reply received");
        Ok(ProxyResponse::tunneled(reply.req_id, reply.body))
    }

    async fn fetch_direct(&self, call: RequestBuilder<'_>) -> Result<ProxyResponse> {
        let Some(client) = &self.inner.direct else {
            return Err(TunnelError::RouteNotFound(call.url));
        };

        debug!(url = %call.url, method = %call.method, "No mapping, using direct HTTP");
        let request = OriginRequest {
            method: call.method,
            url: call.url,
            params: call.params,
            headers: call.headers,
            cookies: call.cookies,
            data: call.data,
            json: call.json,
        };
        let timeout = call.timeout.or(self.inner.options.request_timeout);
        let response = outbound::execute(client, request, timeout)
            .await
            .map_err(|e| TunnelError::Http(e.to_string()))?;
        Ok(ProxyResponse::direct(response.body))
    }
}

fn handle_reply(correlator: &RequestCorrelator, message: InboundMessage) {
    match ReplyEnvelope::from_parts(message.content, &message.fields) {
        Ok(reply) => correlator.complete(reply.req_id.clone(), message.source, reply),
        Err(e) => debug!(source = %message.source, "Ignoring inbound message: {}", e),
    }
}

/// A request being assembled, sent with [`send`](RequestBuilder::send)
#[must_use = "requests do nothing until sent"]
pub struct RequestBuilder<'a> {
    proxy: &'a ClientProxy,
    method: Method,
    url: String,
    params: Option<Value>,
    headers: Option<Value>,
    cookies: Option<Value>,
    data: Option<Value>,
    json: Option<Value>,
    req_id: Option<ReqId>,
    timeout: Option<Duration>,
}

impl<'a> RequestBuilder<'a> {
    fn new(proxy: &'a ClientProxy, method: Method, url: String) -> Self {
        Self {
            proxy,
            method,
            url,
            params: None,
            headers: None,
            cookies: None,
            data: None,
            json: None,
            req_id: None,
            timeout: None,
        }
    }

    /// Query parameters
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn headers(mut self, headers: Value) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn cookies(mut self, cookies: Value) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Form fields (object) or a raw body (string)
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    /// Use a caller-chosen request token instead of a generated one
    pub fn req_id(mut self, req_id: ReqId) -> Self {
        self.req_id = Some(req_id);
        self
    }

    /// Deadline for the reply once the request is on its way
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn send(self) -> Result<ProxyResponse> {
        let proxy = self.proxy;
        proxy.execute(self).await
    }
}
