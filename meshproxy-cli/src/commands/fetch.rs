//! Fetch and route command handlers

use crate::HttpMethod;
use anyhow::{Context, Result};
use colored::Colorize;
use meshproxy_client::{ClientConfig, ClientProxy, MeshContext};
use meshproxy_transport::{HttpTransport, HttpTransportConfig, MeshTransport};
use meshproxy_types::{LocalIdentity, ReqId};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Parsed `fetch` arguments
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: HttpMethod,
    pub params: Vec<String>,
    pub headers: Vec<String>,
    pub cookies: Vec<String>,
    pub data: Vec<String>,
    pub json: Option<String>,
    pub req_id: Option<String>,
    pub timeout: Option<u64>,
}

pub fn route(config: &ClientConfig, url: &str) {
    match config.mapping_table().route(url) {
        Some(route) => {
            println!("{} {}", "✓".green().bold(), url.cyan());
            println!("  Gateway: {}", route.destination.to_string().cyan());
            println!("  Target:  {}", route.target);
        }
        None if config.allow_direct_http => {
            println!("{} No mapping, sent as direct HTTP", "→".yellow().bold());
        }
        None => {
            println!("{} No mapping and direct HTTP is disabled", "✗".red().bold());
        }
    }
}

pub async fn handle(config: &ClientConfig, request: FetchRequest) -> Result<()> {
    let transport_config = HttpTransportConfig {
        listen_addr: config
            .transport
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", config.transport.listen_addr))?,
        public_url: config.transport.public_url.clone(),
        seed_peers: config.transport.peers.clone(),
        ..HttpTransportConfig::default()
    };

    // Clients use a fresh identity per launch
    let transport = HttpTransport::bind(transport_config, LocalIdentity::generate())
        .await
        .context("Failed to start mesh transport")?;
    transport.announce();
    let transport: Arc<dyn MeshTransport> = Arc::new(transport);

    let proxy = ClientProxy::new(
        MeshContext::new(transport),
        config.mapping_table(),
        config.proxy_options(),
    )?;

    let (verb, mut call) = match request.method {
        HttpMethod::Get => ("GET", proxy.get(request.url.as_str())),
        HttpMethod::Post => ("POST", proxy.post(request.url.as_str())),
    };
    eprintln!("{} {} {}", "→".cyan().bold(), verb, request.url.cyan());

    if let Some(params) = pairs(&request.params)? {
        call = call.params(params);
    }
    if let Some(headers) = pairs(&request.headers)? {
        call = call.headers(headers);
    }
    if let Some(cookies) = pairs(&request.cookies)? {
        call = call.cookies(cookies);
    }
    if let Some(data) = pairs(&request.data)? {
        call = call.data(data);
    }
    if let Some(json) = &request.json {
        let value: Value = serde_json::from_str(json).context("--json is not valid JSON")?;
        call = call.json(value);
    }
    if let Some(req_id) = request.req_id {
        call = call.req_id(ReqId::new(req_id)?);
    }
    if let Some(secs) = request.timeout {
        call = call.timeout(Duration::from_secs(secs));
    }

    match call.send().await {
        Ok(response) => {
            if let Some(req_id) = response.req_id() {
                eprintln!("{} Reply for request {}", "✓".green().bold(), req_id.to_string().cyan());
            }
            println!("{}", response.text());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e.to_string().red());
            Err(e.into())
        }
    }
}

/// Turn `key=value` arguments into a JSON object, `None` when empty
fn pairs(args: &[String]) -> Result<Option<Value>> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut object = Map::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .with_context(|| format!("Expected key=value, got {:?}", arg))?;
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(Some(Value::Object(object)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pairs_builds_object() {
        let args = vec!["unit=sat".to_string(), "note=a=b".to_string()];
        assert_eq!(
            pairs(&args).unwrap(),
            Some(json!({"unit": "sat", "note": "a=b"}))
        );
    }

    #[test]
    fn test_pairs_empty_and_malformed() {
        assert_eq!(pairs(&[]).unwrap(), None);
        assert!(pairs(&["nokey".to_string()]).is_err());
    }
}
