//! Copy-on-write lookup caches shared by scrape workers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Thread-safe key/value map that is replaced wholesale instead of mutated in place.
///
/// Readers load the current snapshot without locking and never observe a partially
/// applied update. Writers build a new map and swap it in.
pub struct ListingCache<K, V> {
    inner: ArcSwap<HashMap<K, V>>,
}

impl<K, V> ListingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.load().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Returns the current snapshot. Later swaps do not affect it.
    pub fn snapshot(&self) -> Arc<HashMap<K, V>> {
        self.inner.load_full()
    }

    /// Swaps in a whole new map.
    pub fn replace(&self, map: HashMap<K, V>) {
        self.inner.store(Arc::new(map));
    }
}

impl<K, V> Default for ListingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Marketplace taxonomies used to translate subscriptions into crawl parameters.
#[derive(Default)]
pub struct TaxonomyCache {
    /// Chassis (body type) display name to marketplace-internal id.
    pub chassis: ListingCache<String, String>,
}

impl TaxonomyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves chassis names to ids, dropping names that are not known.
    pub fn resolve_chassis(&self, names: &[String]) -> Vec<String> {
        let snapshot = self.chassis.snapshot();
        names
            .iter()
            .filter_map(|name| snapshot.get(name).cloned())
            .collect()
    }
}
