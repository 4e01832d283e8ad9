//! meshproxy client
//!
//! An HTTP-call-shaped facade over the mesh. Callers write
//!
//! ```ignore
//! let response = proxy.get("https://mint.example/keys").send().await?;
//! let keys: Keys = response.json()?;
//! ```
//!
//! and URLs matching a [`MappingTable`] prefix travel as request envelopes
//! to the gateway serving that prefix.

pub mod config;
pub mod mapping;
pub mod proxy;
pub mod response;

pub use config::{ClientConfig, ConfigError, TransportSection};
pub use mapping::{Mapping, MappingTable, Route};
pub use proxy::{ClientProxy, ProxyOptions, RequestBuilder};
pub use response::ProxyResponse;

pub use meshproxy_core::{MeshContext, Result, TunnelError};
