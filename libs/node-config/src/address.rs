//! Node address value type.
//!
//! A `NodeAddress` is always a well-formed absolute `http`/`https` URL with a
//! host and an optional port. Path, query and fragment are dropped on parse:
//! the address identifies the node, not a resource on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Scheme prepended to user input that has none.
pub const DEFAULT_SCHEME: &str = "http";

/// Address used when nothing was configured (or the stored value is unusable).
pub const DEFAULT_ADDRESS: &str = "http://localhost:7888";

const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

/// Address of the Pyrsia node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    url: Url,
}

impl NodeAddress {
    /// Parse user input, prepending [`DEFAULT_SCHEME`] when the input has no scheme.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }

        let candidate = with_default_scheme(trimmed);
        let url = Url::parse(&candidate).map_err(|e| ConfigError::invalid(input, e.to_string()))?;
        Self::from_url(url).map_err(|reason| ConfigError::invalid(input, reason))
    }

    /// Build an address from its parts.
    pub fn from_parts(scheme: &str, host: &str, port: Option<u16>) -> Result<Self, ConfigError> {
        let input = match port {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        };
        Self::parse(&input)
    }

    fn from_url(mut url: Url) -> Result<Self, String> {
        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(format!("unsupported scheme '{}'", url.scheme()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err("missing host".to_string());
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err("credentials are not allowed in the node address".to_string());
        }

        url.set_path("");
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { url })
    }

    /// URL scheme, lower case (`http` or `https`).
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host name or IP literal.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Explicit port. `None` when absent or equal to the scheme's default port.
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// `host[:port]`, the form shown in input prompts (e.g. `localhost:7888`).
    pub fn authority(&self) -> String {
        match self.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    /// `scheme://host[:port]` without a trailing slash.
    pub fn with_scheme(&self) -> String {
        format!("{}://{}", self.scheme(), self.authority())
    }

    /// Absolute URL of an endpoint on the node.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.with_scheme(), path.trim_start_matches('/'))
    }

    /// Whether both addresses name the same `host[:port]`, whatever the scheme.
    pub fn same_authority(&self, other: &NodeAddress) -> bool {
        self.host() == other.host() && self.port() == other.port()
    }
}

impl Default for NodeAddress {
    fn default() -> Self {
        let url = Url::parse(DEFAULT_ADDRESS).expect("default node address is a valid URL");
        Self { url }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.with_scheme())
    }
}

impl FromStr for NodeAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodeAddress> for String {
    fn from(value: NodeAddress) -> Self {
        value.with_scheme()
    }
}

/// Prefix `input` with `DEFAULT_SCHEME://` unless it already carries a scheme.
///
/// The check is case-insensitive, so `HTTP://host` is left as is.
pub fn with_default_scheme(input: &str) -> String {
    if has_scheme(input) {
        input.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{input}")
    }
}

fn has_scheme(input: &str) -> bool {
    input.split_once("://").is_some_and(|(scheme, _)| {
        scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_address() {
        let address = NodeAddress::default();
        assert_eq!(address.scheme(), "http");
        assert_eq!(address.host(), "localhost");
        assert_eq!(address.port(), Some(7888));
        assert_eq!(address.with_scheme(), "http://localhost:7888");
    }

    #[rstest]
    #[case("localhost:7888", "http://localhost:7888")]
    #[case("http://localhost:7888", "http://localhost:7888")]
    #[case("HTTP://localhost:7888", "http://localhost:7888")]
    #[case("https://node.example.com", "https://node.example.com")]
    #[case("  10.0.0.5:7888/ ", "http://10.0.0.5:7888")]
    #[case("node.local:7888/v2?x=1", "http://node.local:7888")]
    fn test_parse_normalizes(#[case] input: &str, #[case] expected: &str) {
        let address = NodeAddress::parse(input).unwrap();
        assert_eq!(address.with_scheme(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("ftp://localhost:7888")]
    #[case("localhost:notaport")]
    #[case("http://")]
    #[case("http://user:pw@localhost:7888")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(NodeAddress::parse(input).is_err());
    }

    #[rstest]
    #[case("localhost:7888", "http://localhost:7888")]
    #[case("http://localhost:7888", "http://localhost:7888")]
    #[case("Https://localhost", "Https://localhost")]
    fn test_with_default_scheme(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(with_default_scheme(input), expected);
    }

    #[test]
    fn test_endpoint() {
        let address = NodeAddress::parse("localhost:7888").unwrap();
        assert_eq!(address.endpoint("/v2"), "http://localhost:7888/v2");
        assert_eq!(address.endpoint("status"), "http://localhost:7888/status");
    }

    #[test]
    fn test_from_parts() {
        let address = NodeAddress::from_parts("https", "node.example.com", Some(8443)).unwrap();
        assert_eq!(address.authority(), "node.example.com:8443");
        assert!(NodeAddress::from_parts("gopher", "node", None).is_err());
    }

    #[rstest]
    #[case("https://localhost:7888", true)]
    #[case("LOCALHOST:7888", true)]
    #[case("localhost:7889", false)]
    #[case("localhost", false)]
    #[case("localhost.local:7888", false)]
    fn test_same_authority(#[case] other: &str, #[case] expected: bool) {
        let address = NodeAddress::parse("localhost:7888").unwrap();
        let other = NodeAddress::parse(other).unwrap();
        assert_eq!(address.same_authority(&other), expected);
    }

    #[test]
    fn test_serde_as_string() {
        let address = NodeAddress::parse("localhost:7888").unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"http://localhost:7888\"");

        let back: NodeAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);

        assert!(serde_json::from_str::<NodeAddress>("\"ftp://x\"").is_err());
    }
}
