//! Property tests for node address normalization through the store.

use std::sync::Arc;

use proptest::prelude::*;
use pyrsia_node_config::{with_default_scheme, MemoryState, NodeConfigStore};

fn host_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}(\\.[a-z][a-z0-9]{0,8}){0,2}"
}

proptest! {
    #[test]
    fn scheme_is_prefixed_exactly_once(host in host_strategy(), port in 1u16..u16::MAX, upper in any::<bool>()) {
        let store = NodeConfigStore::new(Arc::new(MemoryState::new()));
        let scheme = if upper { "HTTP://" } else { "" };
        store.set_address(format!("{scheme}{host}:{port}").as_str()).unwrap();

        let with_scheme = store.address_with_scheme();
        prop_assert!(with_scheme.starts_with("http://"));
        prop_assert_eq!(with_scheme.matches("://").count(), 1);

        store.set_address(with_scheme.as_str()).unwrap();
        prop_assert_eq!(store.address_with_scheme(), with_scheme);
    }

    #[test]
    fn default_scheme_is_idempotent(host in host_strategy(), port in 1u16..u16::MAX) {
        let once = with_default_scheme(&format!("{host}:{port}"));
        prop_assert_eq!(with_default_scheme(&once), once);
    }
}

#[test]
fn invalid_edit_keeps_previous_address() {
    let store = NodeConfigStore::new(Arc::new(MemoryState::new()));
    store.set_address("node.local:7888").unwrap();

    assert!(store.set_address("http://").is_err());
    assert!(store.set_address("ftp://node.local").is_err());
    assert_eq!(store.address_with_scheme(), "http://node.local:7888");
}
