use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ratingflow_core::EntityId;

/// Default number of lock stripes.
pub const DEFAULT_STRIPES: usize = 64;

/// Striped per-key mutual exclusion.
///
/// Each key hashes to one of a fixed number of stripes. Holding a key's guard
/// serializes all work for that key; unrelated keys only contend when they
/// share a stripe. The stripe count is fixed, so memory does not grow with the
/// key universe.
#[derive(Debug)]
pub struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl KeyLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }

    pub fn stripe_of(&self, key: EntityId) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Block until `key` is exclusively held by the caller.
    pub fn lock(&self, key: EntityId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn same_key_always_maps_to_same_stripe() {
        let locks = KeyLocks::new(8);
        for k in 0..100 {
            let id = EntityId::new(k);
            assert_eq!(locks.stripe_of(id), locks.stripe_of(id));
            assert!(locks.stripe_of(id) < 8);
        }
    }

    #[test]
    fn zero_stripes_is_clamped_to_one() {
        let locks = KeyLocks::new(0);
        assert_eq!(locks.stripes(), 1);
        let _g = locks.lock(EntityId::new(5));
    }

    #[test]
    fn holders_of_one_key_never_overlap() {
        let locks = Arc::new(KeyLocks::new(4));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let _g = locks.lock(EntityId::new(42));
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
