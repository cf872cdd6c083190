use crate::imports::*;
use std::sync::{Mutex, PoisonError};

/// A small least-recently-used map from source text to a shared parse.
///
/// Hits hand back the same `Arc`, so identical scripts share one parsed value.
pub(crate) struct LruCache<V> {
    capacity: usize,
    inner: Mutex<Entries<V>>,
}

struct Entries<V> {
    map: HashMap<String, Arc<V>>,
    /// Least recently used at the front.
    order: VecDeque<String>,
}

impl<V> LruCache<V> {
    pub(crate) fn new(capacity: usize) -> Self {
        LruCache {
            capacity: capacity.max(1),
            inner: Mutex::new(Entries {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> V) -> Arc<V> {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = entries.map.get(key).cloned() {
            if let Some(at) = entries.order.iter().position(|k| k == key) {
                entries.order.remove(at);
            }
            entries.order.push_back(key.to_string());
            return value;
        }

        let value = Arc::new(make());
        while entries.map.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else { break };
            entries.map.remove(&oldest);
        }
        entries.map.insert(key.to_string(), value.clone());
        entries.order.push_back(key.to_string());
        value
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_share_the_value_and_the_oldest_is_evicted() {
        let cache = LruCache::new(2);
        let first = cache.get_or_insert_with("a", || 1);
        let again = cache.get_or_insert_with("a", || 99);
        assert!(Arc::ptr_eq(&first, &again));

        cache.get_or_insert_with("b", || 2);
        // touching `a` makes `b` the oldest
        cache.get_or_insert_with("a", || 99);
        cache.get_or_insert_with("c", || 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get_or_insert_with("a", || 99), 1);
        assert_eq!(*cache.get_or_insert_with("b", || 20), 20);
    }
}
