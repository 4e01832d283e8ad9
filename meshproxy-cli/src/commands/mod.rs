//! Command handlers

pub mod fetch;
pub mod identity;

use anyhow::Context;
use meshproxy_client::ClientConfig;
use std::path::Path;

/// Load the client config from `path`, or from the default location when it
/// exists. A missing default file means an empty configuration.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    if let Some(path) = path {
        return ClientConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let default_path = ClientConfig::default_path()?;
    if default_path.exists() {
        ClientConfig::load(&default_path)
            .with_context(|| format!("Failed to load config {}", default_path.display()))
    } else {
        Ok(ClientConfig::default())
    }
}
