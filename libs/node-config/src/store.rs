//! Node configuration store.
//!
//! Single source of truth for the node address. Readers get a cloned
//! [`NodeAddress`]; dependents that need to react to edits subscribe to a
//! `watch` channel.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::address::NodeAddress;
use crate::error::ConfigError;
use crate::state::{Publisher, StateBackend};

/// State key of the persisted node address.
pub const NODE_URL_KEY: &str = "PYRSIA_NODE_URL_KEY";

/// State key of the "connection configured" flag.
pub const NODE_CONFIGURED_KEY: &str = "pyrsia.node.configured";

/// Input accepted by [`NodeConfigStore::set_address`].
#[derive(Debug, Clone)]
pub enum AddressInput<'a> {
    /// Nothing was entered (e.g. the prompt was dismissed).
    Empty,
    /// Raw user text, normalized before use.
    Text(&'a str),
    /// An already validated address.
    Address(NodeAddress),
}

impl<'a> From<&'a str> for AddressInput<'a> {
    fn from(value: &'a str) -> Self {
        if value.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }
}

impl<'a> From<Option<&'a str>> for AddressInput<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(Self::Empty, Self::from)
    }
}

impl From<NodeAddress> for AddressInput<'_> {
    fn from(value: NodeAddress) -> Self {
        Self::Address(value)
    }
}

impl From<Option<NodeAddress>> for AddressInput<'_> {
    fn from(value: Option<NodeAddress>) -> Self {
        value.map_or(Self::Empty, Self::Address)
    }
}

/// Result of a `set_address` call that did not fail validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressUpdate {
    /// The stored address is now the given value.
    Updated(NodeAddress),
    /// Empty input; the previous address was kept.
    Unchanged,
}

/// Node configuration store.
pub struct NodeConfigStore {
    backend: Arc<dyn StateBackend>,
    publisher: Option<Arc<dyn Publisher>>,
    address: watch::Sender<NodeAddress>,
}

impl NodeConfigStore {
    /// Create a store, loading the persisted address from `backend`.
    ///
    /// A missing or unparsable stored value falls back to the default address.
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        let address = match backend.get(NODE_URL_KEY) {
            Some(Value::String(stored)) => NodeAddress::parse(&stored).unwrap_or_else(|e| {
                warn!(error = %e, "Stored node address is invalid, using default");
                NodeAddress::default()
            }),
            Some(other) => {
                warn!(value = %other, "Stored node address is not a string, using default");
                NodeAddress::default()
            }
            None => NodeAddress::default(),
        };

        let (tx, _rx) = watch::channel(address);
        Self {
            backend,
            publisher: None,
            address: tx,
        }
    }

    /// Attach a publisher that observes every persisted key.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Current address. Never fails.
    pub fn address(&self) -> NodeAddress {
        self.address.borrow().clone()
    }

    /// Current address as `scheme://host[:port]`, scheme present exactly once.
    pub fn address_with_scheme(&self) -> String {
        self.address.borrow().with_scheme()
    }

    /// Whether an address was ever explicitly configured.
    pub fn is_configured(&self) -> bool {
        matches!(self.backend.get(NODE_CONFIGURED_KEY), Some(Value::Bool(true)))
    }

    /// Subscribe to address changes.
    pub fn subscribe(&self) -> watch::Receiver<NodeAddress> {
        self.address.subscribe()
    }

    /// Replace the address.
    ///
    /// Empty input keeps the current value and only logs a warning. Invalid
    /// input keeps the current value and returns the validation error so the
    /// caller can show it. On success the value is persisted, the
    /// "configured" flag is set and subscribers are notified (only if the
    /// address actually changed).
    pub fn set_address<'a>(
        &self,
        input: impl Into<AddressInput<'a>>,
    ) -> Result<AddressUpdate, ConfigError> {
        let address = match input.into() {
            AddressInput::Empty => {
                warn!("Node address not updated, no address was provided");
                return Ok(AddressUpdate::Unchanged);
            }
            AddressInput::Text(text) => match NodeAddress::parse(text) {
                Ok(address) => address,
                Err(e) => {
                    warn!(input = %text, error = %e, "Rejected node address");
                    return Err(e);
                }
            },
            AddressInput::Address(address) => address,
        };

        // Nothing is applied or announced until both keys are stored.
        let url = Value::String(address.with_scheme());
        self.backend.update(NODE_URL_KEY, url.clone())?;
        self.backend.update(NODE_CONFIGURED_KEY, Value::Bool(true))?;

        let changed = self.address.send_if_modified(|current| {
            if *current == address {
                false
            } else {
                *current = address.clone();
                true
            }
        });

        info!(address = %address, changed, "Node address set");

        if let Some(publisher) = &self.publisher {
            publisher.publish(NODE_URL_KEY, &url);
            publisher.publish(NODE_CONFIGURED_KEY, &Value::Bool(true));
        }

        Ok(AddressUpdate::Updated(address))
    }
}
