//! Thread-safe id → value table with auto-incrementing ids.
//!
//! Backs the room catalog, each room's membership and each room's replay
//! buffer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

struct Inner<T> {
    entries: HashMap<u64, T>,
    next_id: u64,
}

/// Shared table keyed by `u64` ids starting at 1.
///
/// Ids are never reused, even after removal. Uses `parking_lot::Mutex` for
/// non-poisoning, fast locking; the lock is never held across a callback.
pub struct ConcurrentRegistry<T> {
    inner: Mutex<Inner<T>>,
    /// Mirror of `entries.len()`, readable without taking the lock.
    approx_len: AtomicUsize,
}

impl<T: Clone> ConcurrentRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_id: 1,
            }),
            approx_len: AtomicUsize::new(0),
        }
    }

    /// Store `value` under the next unused id and return that id.
    pub fn add(&self, value: T) -> u64 {
        self.add_with(|_| value).0
    }

    /// Allocate the next id and build the stored value from it, atomically.
    /// Returns the id and a clone of the stored value.
    ///
    /// `build` runs under the lock and must not touch this registry.
    pub fn add_with(&self, build: impl FnOnce(u64) -> T) -> (u64, T) {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let value = build(id);
        inner.entries.insert(id, value.clone());
        self.approx_len.store(inner.entries.len(), Ordering::Relaxed);
        (id, value)
    }

    /// Store `value` under an explicit id, replacing any previous value.
    ///
    /// The id counter moves past `id` so later [`add`](Self::add) calls can
    /// never hand it out again.
    pub fn add_with_id(&self, value: T, id: u64) -> u64 {
        let mut inner = self.inner.lock();
        inner.entries.insert(id, value);
        inner.next_id = inner.next_id.max(id.saturating_add(1));
        self.approx_len.store(inner.entries.len(), Ordering::Relaxed);
        id
    }

    /// Remove the entry if present. No-op otherwise.
    pub fn remove(&self, id: u64) -> Option<T> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(&id);
        self.approx_len.store(inner.entries.len(), Ordering::Relaxed);
        removed
    }

    pub fn get(&self, id: u64) -> Option<T> {
        self.inner.lock().entries.get(&id).cloned()
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<(u64, T)> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .map(|(id, value)| (*id, value.clone()))
            .collect()
    }

    /// Call `f` for every entry of a snapshot taken under the lock.
    ///
    /// The lock is released before the first call, so `f` may add, remove or
    /// look up entries of this same registry. Changes made during iteration
    /// are not visible to the iteration itself.
    pub fn for_each(&self, mut f: impl FnMut(u64, &T)) {
        for (id, value) in self.snapshot() {
            f(id, &value);
        }
    }

    /// Approximate number of entries. For diagnostics only.
    pub fn len(&self) -> usize {
        self.approx_len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for ConcurrentRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let registry = ConcurrentRegistry::new();
        assert_eq!(registry.add("a"), 1);
        assert_eq!(registry.add("b"), 2);
        assert_eq!(registry.get(1), Some("a"));
        assert_eq!(registry.get(2), Some("b"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removed_ids_are_never_reused() {
        let registry = ConcurrentRegistry::new();
        let first = registry.add(10);
        registry.remove(first);
        let second = registry.add(20);
        assert_ne!(first, second);
        assert_eq!(registry.get(first), None);
        assert_eq!(registry.get(second), Some(20));
    }

    #[test]
    fn remove_missing_is_noop() {
        let registry: ConcurrentRegistry<u8> = ConcurrentRegistry::new();
        assert!(registry.remove(42).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn explicit_id_is_not_handed_out_again() {
        let registry = ConcurrentRegistry::new();
        assert_eq!(registry.add_with_id("pinned", 5), 5);
        assert_eq!(registry.add("next"), 6);
        assert_eq!(registry.get(5), Some("pinned"));
    }

    #[test]
    fn add_with_sees_its_own_id() {
        let registry = ConcurrentRegistry::new();
        registry.add("filler".to_string());
        let (id, value) = registry.add_with(|id| format!("room-{id}"));
        assert_eq!(value, "room-2");
        assert_eq!(registry.get(id).as_deref(), Some("room-2"));
    }

    #[test]
    fn for_each_callback_can_reenter_registry() {
        let registry = ConcurrentRegistry::new();
        registry.add(1u32);
        registry.add(2u32);
        registry.add(3u32);

        let mut visited = 0;
        registry.for_each(|id, value| {
            visited += 1;
            // Would deadlock if the lock were still held.
            assert_eq!(registry.get(id), Some(*value));
            registry.remove(id);
            registry.add(value * 10);
        });

        assert_eq!(visited, 3, "snapshot excludes entries added mid-iteration");
        let mut values: Vec<u32> = registry.snapshot().into_iter().map(|(_, v)| v).collect();
        values.sort();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn concurrent_adds_and_removes_linearize() {
        let registry = Arc::new(ConcurrentRegistry::new());
        let threads = 8;
        let per_thread = 500;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..per_thread {
                        let id = registry.add((t, i));
                        // Remove every other entry we inserted.
                        if i % 2 == 0 {
                            registry.remove(id);
                        } else {
                            kept.push(id);
                        }
                    }
                    kept
                })
            })
            .collect();

        let mut expected = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(expected.insert(id), "id {id} handed out twice");
            }
        }

        let actual: HashSet<u64> = registry.snapshot().into_iter().map(|(id, _)| id).collect();
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), threads * per_thread / 2);
    }
}
