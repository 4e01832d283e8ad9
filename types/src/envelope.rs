//! Request and reply envelopes
//!
//! On the mesh a message is `(title, content, fields)`. The tunnel protocol
//! lives entirely in `content` and the [`Fields`] map:
//!
//! ```text
//! request:  content = target path/body, fields = { req_id, method, params?, headers?, cookies?, data?, json? }
//! reply:    content = response body,    fields = { req_id }
//! ```

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of generated request tokens
pub const REQ_ID_LEN: usize = 4;

/// Title carried by gateway replies
pub const REPLY_TITLE: &str = "ACK";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Envelope has no req_id")]
    MissingReqId,

    #[error("Envelope has no method")]
    MissingMethod,

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid req_id: {0}")]
    InvalidReqId(String),
}

/// Short request token used to correlate a reply with its request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReqId(String);

impl ReqId {
    pub fn new(token: impl Into<String>) -> Result<Self, EnvelopeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(EnvelopeError::InvalidReqId("empty token".to_string()));
        }
        Ok(Self(token))
    }

    /// Random alphanumeric token of [`REQ_ID_LEN`] characters
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let token: String = rng
            .sample_iter(&Alphanumeric)
            .take(REQ_ID_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReqId {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Tunneled HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            other => Err(EnvelopeError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Wire field map carried alongside message content.
///
/// Every entry is optional so the same shape serves requests and replies, and
/// so a malformed peer message can still be decoded far enough to be logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl Fields {
    /// Short description for log lines, e.g. `GET request ID ab12`
    pub fn describe(&self) -> String {
        format!(
            "{} request ID {}",
            self.method.as_deref().unwrap_or(""),
            self.req_id.as_deref().unwrap_or("")
        )
    }

    pub fn req_id(&self) -> Result<ReqId, EnvelopeError> {
        let token = self.req_id.as_deref().ok_or(EnvelopeError::MissingReqId)?;
        ReqId::new(token)
    }
}

/// Tunneled HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub req_id: ReqId,
    pub method: Method,
    /// Path (with the routing prefix stripped) appended to the origin URL
    pub target: String,
    pub params: Option<Value>,
    pub headers: Option<Value>,
    pub cookies: Option<Value>,
    pub data: Option<Value>,
    pub json: Option<Value>,
}

impl RequestEnvelope {
    pub fn new(req_id: ReqId, method: Method, target: impl Into<String>) -> Self {
        Self {
            req_id,
            method,
            target: target.into(),
            params: None,
            headers: None,
            cookies: None,
            data: None,
            json: None,
        }
    }

    /// Split into message `(content, fields)`
    pub fn into_parts(self) -> (String, Fields) {
        let fields = Fields {
            req_id: Some(self.req_id.0),
            method: Some(self.method.as_str().to_string()),
            params: self.params,
            headers: self.headers,
            cookies: self.cookies,
            data: self.data,
            json: self.json,
        };
        (self.target, fields)
    }

    /// Rebuild from message `(content, fields)`, rejecting anything the
    /// gateway cannot answer
    pub fn from_parts(content: String, fields: Fields) -> Result<Self, EnvelopeError> {
        let req_id = fields.req_id()?;
        let method = fields
            .method
            .as_deref()
            .ok_or(EnvelopeError::MissingMethod)?
            .parse()?;
        Ok(Self {
            req_id,
            method,
            target: content,
            params: fields.params,
            headers: fields.headers,
            cookies: fields.cookies,
            data: fields.data,
            json: fields.json,
        })
    }
}

/// Tunneled HTTP response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEnvelope {
    pub req_id: ReqId,
    pub body: String,
}

impl ReplyEnvelope {
    pub fn new(req_id: ReqId, body: impl Into<String>) -> Self {
        Self {
            req_id,
            body: body.into(),
        }
    }

    pub fn into_parts(self) -> (String, Fields) {
        let fields = Fields {
            req_id: Some(self.req_id.0),
            ..Fields::default()
        };
        (self.body, fields)
    }

    pub fn from_parts(content: String, fields: &Fields) -> Result<Self, EnvelopeError> {
        Ok(Self {
            req_id: fields.req_id()?,
            body: content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_random_req_id_shape() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let id = ReqId::random(&mut rng);
            assert_eq!(id.as_str().len(), REQ_ID_LEN);
            assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_empty_req_id_rejected() {
        assert!(matches!(ReqId::new(""), Err(EnvelopeError::InvalidReqId(_))));
    }

    #[test]
    fn test_request_wire_shape() {
        let mut envelope = RequestEnvelope::new(ReqId::new("ab12").unwrap(), Method::Get, "resource");
        envelope.params = Some(json!({"amount": 64}));

        let (content, fields) = envelope.into_parts();
        assert_eq!(content, "resource");

        let wire = serde_json::to_value(&fields).unwrap();
        assert_eq!(
            wire,
            json!({"req_id": "ab12", "method": "GET", "params": {"amount": 64}})
        );
    }

    #[test]
    fn test_request_from_parts_requires_req_id() {
        let fields = Fields {
            method: Some("GET".to_string()),
            ..Fields::default()
        };
        assert_eq!(
            RequestEnvelope::from_parts("x".to_string(), fields),
            Err(EnvelopeError::MissingReqId)
        );
    }

    #[test]
    fn test_request_from_parts_rejects_other_methods() {
        let fields = Fields {
            req_id: Some("ab12".to_string()),
            method: Some("DELETE".to_string()),
            ..Fields::default()
        };
        assert_eq!(
            RequestEnvelope::from_parts("x".to_string(), fields),
            Err(EnvelopeError::UnsupportedMethod("DELETE".to_string()))
        );
    }

    #[test]
    fn test_reply_carries_only_req_id() {
        let reply = ReplyEnvelope::new(ReqId::new("ab12").unwrap(), "OK");
        let (content, fields) = reply.into_parts();
        assert_eq!(content, "OK");
        assert_eq!(serde_json::to_value(&fields).unwrap(), json!({"req_id": "ab12"}));
    }

    #[test]
    fn test_describe() {
        let fields = Fields {
            req_id: Some("Zx9q".to_string()),
            method: Some("POST".to_string()),
            ..Fields::default()
        };
        assert_eq!(fields.describe(), "POST request ID Zx9q");
    }
}
