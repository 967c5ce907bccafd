//! Broker configuration snapshot and attribute cache.
//!
//! Both are captured at module-create time and handed to the worker thread
//! so that configuration and attribute lookups inside a module are always
//! served locally, without a round trip to the broker.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
// (none)

/// Immutable snapshot of the broker's configuration tree.
///
/// Cheap to clone (`Arc`-shared). A module's handle carries a clone so that
/// `ModuleHandle::config()` always succeeds, even while the broker reloads
/// its own configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    root: Arc<Value>,
}

impl ConfigSnapshot {
    /// Snapshot an owned configuration tree.
    pub fn new(root: Value) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// The whole tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up a dotted key (`"section.key"`) in the tree.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut node = self.root.as_ref();
        for part in key.split('.') {
            node = node.get(part)?;
        }
        Some(node)
    }
}

/// Immutable cache of broker attributes (rank, size, uri, ...).
///
/// Primed into each module handle at thread start so attribute lookups in
/// module code never leave the thread.
#[derive(Debug, Clone, Default)]
pub struct AttrCache {
    attrs: HashMap<String, String>,
}

impl AttrCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from (name, value) pairs.
    pub fn from_iter<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attrs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Iterate over all cached attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of cached attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// True if no attributes are cached.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_dotted_lookup() {
        let conf = ConfigSnapshot::new(json!({
            "log": { "level": "debug" },
            "rank": 0,
        }));

        assert_eq!(conf.get("log.level"), Some(&json!("debug")));
        assert_eq!(conf.get("rank"), Some(&json!(0)));
        assert_eq!(conf.get("log.missing"), None);
        assert_eq!(conf.get("nope"), None);
    }

    #[test]
    fn test_config_clone_shares_tree() {
        let conf = ConfigSnapshot::new(json!({"a": 1}));
        let clone = conf.clone();
        assert_eq!(clone.get("a"), conf.get("a"));
    }

    #[test]
    fn test_default_config_is_null() {
        let conf = ConfigSnapshot::default();
        assert!(conf.root().is_null());
        assert_eq!(conf.get("x"), None);
    }

    #[test]
    fn test_attr_cache() {
        let attrs = AttrCache::from_iter([("rank", "3"), ("instance-level", "0")]);
        assert_eq!(attrs.get("rank"), Some("3"));
        assert_eq!(attrs.get("missing"), None);
        assert_eq!(attrs.len(), 2);
        assert!(!attrs.is_empty());
        assert!(AttrCache::new().is_empty());
    }
}
