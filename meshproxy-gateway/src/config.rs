//! Gateway configuration

use crate::announcer::DEFAULT_ANNOUNCE_INTERVAL;
use crate::gateway::GatewayOptions;
use anyhow::Context;
use meshproxy_transport::HttpTransportConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the HTTP service being exposed
    pub origin_url: String,

    /// Name of the persistent identity (`~/.meshproxy/<name>/identity`)
    pub identity_name: String,

    /// Time between presence announces
    pub announce_interval: Duration,

    /// How long to wait for a client's reply path
    pub resolve_timeout: Duration,

    /// Deadline for origin calls
    pub http_timeout: Duration,

    /// Mesh endpoint listen address
    pub listen_addr: SocketAddr,

    /// URL peers use to reach this node
    pub public_url: Option<String>,

    /// Seed peers
    pub peers: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            origin_url: "http://127.0.0.1:3338/".to_string(),
            identity_name: "meshproxy-gateway".to_string(),
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            resolve_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(5),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 4242)),
            public_url: None,
            peers: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// unset keys
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("Invalid {}: {}", key, value)),
                None => Ok(default),
            }
        };

        let listen_addr = match lookup("MESHPROXY_LISTEN_ADDR") {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid MESHPROXY_LISTEN_ADDR: {}", value))?,
            None => defaults.listen_addr,
        };

        let peers = lookup("MESHPROXY_PEERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|peer| !peer.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            origin_url: lookup("MESHPROXY_ORIGIN_URL").unwrap_or(defaults.origin_url),
            identity_name: lookup("MESHPROXY_IDENTITY_NAME").unwrap_or(defaults.identity_name),
            announce_interval: secs("MESHPROXY_ANNOUNCE_INTERVAL_SECS", defaults.announce_interval)?,
            resolve_timeout: secs("MESHPROXY_RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout)?,
            http_timeout: secs("MESHPROXY_HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            listen_addr,
            public_url: lookup("MESHPROXY_PUBLIC_URL"),
            peers,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.origin_url.starts_with("http://") || self.origin_url.starts_with("https://")) {
            anyhow::bail!("Origin URL must be http(s): {}", self.origin_url);
        }
        if self.identity_name.is_empty()
            || self.identity_name.contains(std::path::is_separator)
            || self.identity_name.starts_with('.')
        {
            anyhow::bail!("Invalid identity name: {:?}", self.identity_name);
        }
        if self.announce_interval.is_zero() {
            anyhow::bail!("Announce interval must be greater than 0");
        }
        if self.resolve_timeout.is_zero() || self.http_timeout.is_zero() {
            anyhow::bail!("Timeouts must be greater than 0");
        }
        Ok(())
    }

    /// `~/.meshproxy/<identity_name>/identity`
    pub fn identity_path(&self) -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot locate home directory")?;
        Ok(home
            .join(".meshproxy")
            .join(&self.identity_name)
            .join("identity"))
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            origin_url: self.origin_url.clone(),
            resolve_timeout: self.resolve_timeout,
            http_timeout: self.http_timeout,
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            listen_addr: self.listen_addr,
            public_url: self.public_url.clone(),
            seed_peers: self.peers.clone(),
            ..HttpTransportConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.announce_interval, Duration::from_secs(1800));
        config.validate().unwrap();
    }

    #[test]
    fn test_reads_every_variable() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("MESHPROXY_ORIGIN_URL", "https://mint.example/"),
            ("MESHPROXY_IDENTITY_NAME", "mint"),
            ("MESHPROXY_ANNOUNCE_INTERVAL_SECS", "60"),
            ("MESHPROXY_RESOLVE_TIMEOUT_SECS", "10"),
            ("MESHPROXY_HTTP_TIMEOUT_SECS", "2"),
            ("MESHPROXY_LISTEN_ADDR", "127.0.0.1:5000"),
            ("MESHPROXY_PUBLIC_URL", "http://gw.example:5000"),
            ("MESHPROXY_PEERS", "http://a:4242, http://b:4242,"),
        ]))
        .unwrap();

        assert_eq!(config.origin_url, "https://mint.example/");
        assert_eq!(config.identity_name, "mint");
        assert_eq!(config.announce_interval, Duration::from_secs(60));
        assert_eq!(config.resolve_timeout, Duration::from_secs(10));
        assert_eq!(config.http_timeout, Duration::from_secs(2));
        assert_eq!(config.listen_addr, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.public_url.as_deref(), Some("http://gw.example:5000"));
        assert_eq!(config.peers, vec!["http://a:4242", "http://b:4242"]);

        let transport = config.transport_config();
        assert_eq!(transport.seed_peers.len(), 2);
        assert_eq!(transport.max_attempts, 5);
        assert_eq!(config.gateway_options().http_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        let err = GatewayConfig::from_lookup(lookup(&[("MESHPROXY_HTTP_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("MESHPROXY_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GatewayConfig {
            origin_url: "mint.example".to_string(),
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());

        config.origin_url = "http://mint.example/".to_string();
        config.identity_name = "../elsewhere".to_string();
        assert!(config.validate().is_err());

        config.identity_name = "mint".to_string();
        config.announce_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identity_path_layout() {
        let config = GatewayConfig {
            identity_name: "mint".to_string(),
            ..GatewayConfig::default()
        };
        if let Ok(path) = config.identity_path() {
            assert!(path.ends_with(".meshproxy/mint/identity"));
        }
    }
}
