//! URL-prefix routing table

use meshproxy_types::DestinationAddress;
use serde::{Deserialize, Serialize};

/// One routing rule: URLs starting with `prefix` go to `destination`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// URL prefix, matched literally
    pub prefix: String,

    /// Gateway serving this prefix
    pub destination: DestinationAddress,
}

/// Result of routing a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: DestinationAddress,

    /// Remainder of the URL after the matched prefix
    pub target: String,
}

/// Ordered mapping table. The first declared prefix that matches wins, even
/// if a later one is longer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    mappings: Vec<Mapping>,
}

impl MappingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule after the existing ones
    pub fn push(&mut self, prefix: impl Into<String>, destination: DestinationAddress) {
        self.mappings.push(Mapping {
            prefix: prefix.into(),
            destination,
        });
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, prefix: impl Into<String>, destination: DestinationAddress) -> Self {
        self.push(prefix, destination);
        self
    }

    pub fn route(&self, url: &str) -> Option<Route> {
        self.mappings.iter().find_map(|mapping| {
            url.strip_prefix(mapping.prefix.as_str()).map(|rest| Route {
                destination: mapping.destination,
                target: rest.to_string(),
            })
        })
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }
}

impl FromIterator<Mapping> for MappingTable {
    fn from_iter<I: IntoIterator<Item = Mapping>>(iter: I) -> Self {
        Self {
            mappings: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(byte: u8) -> DestinationAddress {
        DestinationAddress::from_bytes([byte; 16])
    }

    #[test]
    fn test_first_declared_prefix_wins() {
        let table = MappingTable::new()
            .with("https://a/", dest(1))
            .with("https://a/b/", dest(2));

        let route = table.route("https://a/b/x").unwrap();
        assert_eq!(route.destination, dest(1));
        assert_eq!(route.target, "b/x");
    }

    #[test]
    fn test_order_decides_not_length() {
        let table = MappingTable::new()
            .with("https://a/b/", dest(2))
            .with("https://a/", dest(1));

        let route = table.route("https://a/b/x").unwrap();
        assert_eq!(route.destination, dest(2));
        assert_eq!(route.target, "x");

        let route = table.route("https://a/c").unwrap();
        assert_eq!(route.destination, dest(1));
        assert_eq!(route.target, "c");
    }

    #[test]
    fn test_exact_prefix_gives_empty_target() {
        let table = MappingTable::new().with("https://mint.example/", dest(7));
        let route = table.route("https://mint.example/").unwrap();
        assert_eq!(route.target, "");
    }

    #[test]
    fn test_unmatched_url() {
        let table = MappingTable::new().with("https://a/", dest(1));
        assert!(table.route("https://unmapped/").is_none());
        assert!(table.route("http://a/").is_none());
        assert!(MappingTable::new().route("https://a/").is_none());
    }
}
