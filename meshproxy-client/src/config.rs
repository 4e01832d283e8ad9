//! Client configuration file
//!
//! ```toml
//! allow_direct_http = false
//! resolve_timeout_secs = 300
//! request_timeout_secs = 120
//!
//! [transport]
//! listen_addr = "127.0.0.1:0"
//! peers = ["http://gateway.example:4242"]
//!
//! [[mapping]]
//! prefix = "https://mint.example/"
//! destination = "5f0c3d2b8a7e41c6a9d0e1f2a3b4c5d6"
//! ```

use crate::mapping::{Mapping, MappingTable};
use crate::proxy::ProxyOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory under the home directory holding meshproxy state
pub const CONFIG_DIR: &str = ".meshproxy";

/// Default client configuration file name
pub const CONFIG_FILE: &str = "client.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Cannot locate home directory")]
    NoHomeDir,
}

/// Mesh transport settings used by tools that run a client node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Address the node's mesh endpoints listen on
    pub listen_addr: String,

    /// URL peers use to reach this node
    pub public_url: Option<String>,

    /// Seed peers for announces and path requests
    pub peers: Vec<String>,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            public_url: None,
            peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fall back to a plain HTTP call for URLs no mapping matches
    pub allow_direct_http: bool,

    /// How long to wait for an unknown gateway to become routable
    pub resolve_timeout_secs: u64,

    /// Per-call deadline for the reply; `None` waits indefinitely
    pub request_timeout_secs: Option<u64>,

    pub transport: TransportSection,

    /// Routing rules, first match wins
    pub mapping: Vec<Mapping>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            allow_direct_http: false,
            resolve_timeout_secs: 300,
            request_timeout_secs: None,
            transport: TransportSection::default(),
            mapping: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// `~/.meshproxy/client.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoHomeDir)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolve_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "resolve_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let Some(empty) = self.mapping.iter().position(|m| m.prefix.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "mapping #{} has an empty prefix",
                empty + 1
            )));
        }
        Ok(())
    }

    pub fn mapping_table(&self) -> MappingTable {
        self.mapping.iter().cloned().collect()
    }

    pub fn proxy_options(&self) -> ProxyOptions {
        ProxyOptions {
            allow_direct_http: self.allow_direct_http,
            resolve_timeout: Duration::from_secs(self.resolve_timeout_secs),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshproxy_types::DestinationAddress;
    use std::io::Write;

    const SAMPLE: &str = r#"
allow_direct_http = true
request_timeout_secs = 120

[transport]
peers = ["http://seed.example:4242"]

[[mapping]]
prefix = "https://a/"
destination = "01010101010101010101010101010101"

[[mapping]]
prefix = "https://a/b/"
destination = "02020202020202020202020202020202"
"#;

    #[test]
    fn test_parse_keeps_mapping_order() {
        let config = ClientConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.allow_direct_http);
        assert_eq!(config.resolve_timeout_secs, 300);
        assert_eq!(config.transport.listen_addr, "127.0.0.1:0");
        assert_eq!(config.transport.peers, vec!["http://seed.example:4242"]);

        let table = config.mapping_table();
        assert_eq!(table.len(), 2);
        let route = table.route("https://a/b/x").unwrap();
        assert_eq!(route.destination, DestinationAddress::from_bytes([1; 16]));
        assert_eq!(route.target, "b/x");
    }

    #[test]
    fn test_proxy_options_from_config() {
        let options = ClientConfig::from_toml_str(SAMPLE).unwrap().proxy_options();
        assert!(options.allow_direct_http);
        assert_eq!(options.resolve_timeout, Duration::from_secs(300));
        assert_eq!(options.request_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_rejects_bad_destination() {
        let text = r#"
[[mapping]]
prefix = "https://a/"
destination = "not-hex"
"#;
        assert!(matches!(
            ClientConfig::from_toml_str(text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_empty_prefix() {
        let text = r#"
[[mapping]]
prefix = ""
destination = "01010101010101010101010101010101"
"#;
        assert!(matches!(
            ClientConfig::from_toml_str(text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.mapping.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("client.toml");
        assert!(matches!(
            ClientConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
