//! Real HTTP calls built from envelope fields
//!
//! Used by the gateway to reach its origin and by the client for the direct
//! HTTP fallback. Blob handling:
//! - `params`  -> query string
//! - `headers` -> request headers (object of name -> value)
//! - `cookies` -> a single `Cookie` header
//! - `data`    -> form body when an object, raw body otherwise
//! - `json`    -> JSON body

use crate::error::{Result, TunnelError};
use meshproxy_types::{Method, RequestEnvelope};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One outbound HTTP call
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub method: Method,
    pub url: String,
    pub params: Option<Value>,
    pub headers: Option<Value>,
    pub cookies: Option<Value>,
    pub data: Option<Value>,
    pub json: Option<Value>,
}

impl OriginRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: None,
            headers: None,
            cookies: None,
            data: None,
            json: None,
        }
    }

    /// Target `base` joined with the envelope's path, carrying its blobs
    pub fn from_envelope(base: &str, envelope: RequestEnvelope) -> Self {
        Self {
            method: envelope.method,
            url: join_url(base, &envelope.target),
            params: envelope.params,
            headers: envelope.headers,
            cookies: envelope.cookies,
            data: envelope.data,
            json: envelope.json,
        }
    }
}

/// Status and body of a completed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginResponse {
    pub status: u16,
    pub body: String,
}

impl OriginResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain concatenation, matching how mapping prefixes are stripped
pub fn join_url(base: &str, target: &str) -> String {
    format!("{}{}", base, target)
}

/// Execute `request`. Transport-level failures become
/// [`TunnelError::RemoteUnavailable`]; any status is returned as-is.
pub async fn execute(
    client: &reqwest::Client,
    request: OriginRequest,
    timeout: Option<Duration>,
) -> Result<OriginResponse> {
    let mut builder = match request.method {
        Method::Get => client.get(&request.url),
        Method::Post => client.post(&request.url),
    };

    if let Some(limit) = timeout {
        builder = builder.timeout(limit);
    }
    if let Some(params) = &request.params {
        builder = builder.query(params);
    }

    let mut headers = header_map(request.headers.as_ref());
    if let Some(cookie) = request.cookies.as_ref().and_then(cookie_header) {
        headers.insert(COOKIE, cookie);
    }
    builder = builder.headers(headers);

    match &request.data {
        Some(data @ Value::Object(_)) => builder = builder.form(data),
        Some(Value::String(raw)) => builder = builder.body(raw.clone()),
        Some(Value::Null) | None => {}
        Some(other) => builder = builder.body(other.to_string()),
    }
    if let Some(json) = &request.json {
        builder = builder.json(json);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| TunnelError::RemoteUnavailable(format!("{}: {}", request.url, e)))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| TunnelError::RemoteUnavailable(format!("{}: {}", request.url, e)))?;

    Ok(OriginResponse { status, body })
}

fn value_to_header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn header_map(headers: Option<&Value>) -> HeaderMap {
    let mut map = HeaderMap::new();
    let Some(Value::Object(entries)) = headers else {
        return map;
    };

    for (name, value) in entries {
        let parsed = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value_to_header_text(value)),
        );
        match parsed {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => debug!(header = %name, "Skipping header that is not valid HTTP"),
        }
    }
    map
}

fn cookie_header(cookies: &Value) -> Option<HeaderValue> {
    let text = match cookies {
        Value::Object(entries) if !entries.is_empty() => entries
            .iter()
            .map(|(name, value)| format!("{}={}", name, value_to_header_text(value)))
            .collect::<Vec<_>>()
            .join("; "),
        Value::String(raw) if !raw.is_empty() => raw.clone(),
        _ => return None,
    };
    HeaderValue::from_str(&text).ok()
}
