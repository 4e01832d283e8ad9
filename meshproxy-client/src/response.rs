//! Response returned by the client facade

use meshproxy_core::{Result, TunnelError};
use meshproxy_types::ReqId;
use serde::de::DeserializeOwned;

/// Body of a tunneled (or directly fetched) response.
///
/// The mesh carries no status codes: a reply arriving at all means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    req_id: Option<ReqId>,
    body: String,
}

impl ProxyResponse {
    pub(crate) fn tunneled(req_id: ReqId, body: String) -> Self {
        Self {
            req_id: Some(req_id),
            body,
        }
    }

    pub(crate) fn direct(body: String) -> Self {
        Self { req_id: None, body }
    }

    /// Request token the reply was correlated with; `None` for direct HTTP
    pub fn req_id(&self) -> Option<&ReqId> {
        self.req_id.as_ref()
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn into_text(self) -> String {
        self.body
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| TunnelError::Decode(e.to_string()))
    }

    /// Kept for call sites written against a regular HTTP client. Always
    /// succeeds.
    pub fn error_for_status(self) -> Result<Self> {
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Quote {
        amount: u64,
        unit: String,
    }

    #[test]
    fn test_json_decodes_body() {
        let response = ProxyResponse::direct(r#"{"amount": 64, "unit": "sat"}"#.to_string());
        let quote: Quote = response.json().unwrap();
        assert_eq!(
            quote,
            Quote {
                amount: 64,
                unit: "sat".to_string()
            }
        );
    }

    #[test]
    fn test_json_decode_error() {
        let response = ProxyResponse::direct("OK".to_string());
        assert!(matches!(response.json::<Quote>(), Err(TunnelError::Decode(_))));
    }

    #[test]
    fn test_error_for_status_is_passthrough() {
        let response = ProxyResponse::tunneled(ReqId::new("ab12").unwrap(), "OK".to_string());
        let response = response.error_for_status().unwrap();
        assert_eq!(response.text(), "OK");
        assert_eq!(response.req_id().map(|id| id.as_str()), Some("ab12"));
    }
}
