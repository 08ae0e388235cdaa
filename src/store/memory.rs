use dashmap::DashMap;

/// The only two operations the aggregation logic may assume about
/// persistence. Durable storage belongs to the indexing host; a host adapter
/// supplies its own impls of this trait.
pub trait KeyedStore<V: Clone> {
    fn load(&self, key: &str) -> Option<V>;
    fn save(&self, key: &str, value: V);
}

/// In-memory `KeyedStore` backing, one per entity kind.
pub struct MemoryStore<V> {
    entries: DashMap<String, V>,
}

impl<V: Clone> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all stored values, for the read-only query surface.
    pub fn values(&self) -> Vec<V> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

impl<V: Clone> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> KeyedStore<V> for MemoryStore<V> {
    fn load(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    fn save(&self, key: &str, value: V) {
        self.entries.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_returns_value() {
        let store: MemoryStore<u32> = MemoryStore::new();
        assert!(store.load("a").is_none());
        store.save("a", 7);
        assert_eq!(store.load("a"), Some(7));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_overwrites_existing_key() {
        let store: MemoryStore<u32> = MemoryStore::new();
        store.save("a", 1);
        store.save("a", 2);
        assert_eq!(store.load("a"), Some(2));
        assert_eq!(store.len(), 1);
    }
}
