//! Pyrsia node configuration.
//!
//! Holds the address of the Pyrsia node the panel talks to:
//!
//! - `address`: the [`NodeAddress`] value type and input normalization
//! - `store`: [`NodeConfigStore`], the single source of truth, with change notification
//! - `state`: durable key-value backends the store persists through
//!
//! # Invariants
//!
//! - The store always holds a well-formed absolute URL (default: `http://localhost:7888`)
//! - Scheme, host and port are replaced together, never individually
//! - Invalid input never replaces a valid address

pub mod address;
pub mod error;
pub mod state;
pub mod store;

pub use address::{with_default_scheme, NodeAddress, DEFAULT_ADDRESS, DEFAULT_SCHEME};
pub use error::ConfigError;
pub use state::{config_dir, JsonFileState, MemoryState, Publisher, StateBackend, STATE_FILE};
pub use store::{AddressInput, AddressUpdate, NodeConfigStore, NODE_CONFIGURED_KEY, NODE_URL_KEY};
