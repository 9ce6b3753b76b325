//! A memoizing cache whose readers can wait for an entry that is still being produced.
//!
//! The first caller of [`BlockingCache::get_or_produce`] for a key becomes its producer; every
//! other caller for that key blocks until the value is published and then receives a clone of
//! it. A producer that unwinds releases its waiters, and the next of them to wake up takes over.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// Errors produced while waiting on the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("timed out after {0:?} waiting for a cache entry")]
    /// Another caller was producing the entry and did not finish in time.
    TimedOut(Duration),
}

enum Slot<V> {
    Pending,
    Ready(V),
}

/// Single-producer, many-waiter memoizing map.
pub struct BlockingCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    published: Condvar,
}

impl<K, V> Default for BlockingCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            published: Condvar::new(),
        }
    }
}

impl<K, V> BlockingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The published value for `key`, without waiting.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Return the value for `key`, producing it with `produce` if nobody has.
    ///
    /// If another caller is producing the same key, this waits up to `timeout` for it to
    /// publish. `produce` runs without the cache lock held, so it may itself use the cache for
    /// other keys.
    pub fn get_or_produce<F>(&self, key: K, timeout: Duration, produce: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> V,
    {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock();
        loop {
            match slots.get(&key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Pending) => {
                    trace!("waiting for in-flight cache entry");
                    if self.published.wait_until(&mut slots, deadline).timed_out() {
                        return match slots.get(&key) {
                            Some(Slot::Ready(value)) => Ok(value.clone()),
                            _ => Err(CacheError::TimedOut(timeout)),
                        };
                    }
                }
                None => break,
            }
        }
        slots.insert(key.clone(), Slot::Pending);
        drop(slots);

        let mut guard = ProducerGuard {
            cache: self,
            key,
            published: false,
        };
        let value = produce();
        guard.publish(value.clone());
        Ok(value)
    }

    /// Drop the published entry for `key`. In-flight entries are left alone.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Ready(_)) => match slots.remove(key) {
                Some(Slot::Ready(value)) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Keep only the published entries for which `keep` returns `true`.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.slots.lock().retain(|key, slot| match slot {
            Slot::Pending => true,
            Slot::Ready(value) => keep(key, value),
        });
    }

    /// Number of entries, in-flight ones included.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Clears a pending slot if its producer never publishes.
struct ProducerGuard<'a, K, V>
where
    K: Eq + Hash,
{
    cache: &'a BlockingCache<K, V>,
    key: K,
    published: bool,
}

impl<K, V> ProducerGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
{
    fn publish(&mut self, value: V) {
        self.cache
            .slots
            .lock()
            .insert(self.key.clone(), Slot::Ready(value));
        self.published = true;
        self.cache.published.notify_all();
    }
}

impl<K, V> Drop for ProducerGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if self.published {
            return;
        }
        self.cache.slots.lock().remove(&self.key);
        self.cache.published.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    const LONG: Duration = Duration::from_secs(10);

    #[test]
    fn test_single_producer_under_contention() {
        let cache = Arc::new(BlockingCache::<&'static str, usize>::new());
        let produced = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let produced = Arc::clone(&produced);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_produce("dep.pkl", LONG, || {
                            thread::sleep(Duration::from_millis(50));
                            produced.fetch_add(1, Ordering::SeqCst) + 100
                        })
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(produced.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| *v == 100));
        assert_eq!(cache.get(&"dep.pkl"), Some(100));
    }

    #[test]
    fn test_waiter_times_out() {
        let cache = Arc::new(BlockingCache::<u32, u32>::new());
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let producer = {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cache
                    .get_or_produce(1, LONG, || {
                        started.wait();
                        release.wait();
                        7
                    })
                    .unwrap()
            })
        };

        started.wait();
        let short = Duration::from_millis(20);
        assert_eq!(
            cache.get_or_produce(1, short, || 0),
            Err(CacheError::TimedOut(short))
        );
        release.wait();
        assert_eq!(producer.join().unwrap(), 7);
        assert_eq!(cache.get_or_produce(1, short, || 0), Ok(7));
    }

    #[test]
    fn test_panicking_producer_releases_key() {
        let cache = BlockingCache::<u32, u32>::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            cache.get_or_produce(1, LONG, || panic!("parse failed"))
        }));
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_produce(1, LONG, || 3), Ok(3));
    }

    #[test]
    fn test_remove_and_retain() {
        let cache = BlockingCache::<u32, u32>::new();
        for key in 0..4 {
            cache.get_or_produce(key, LONG, || key * 10).unwrap();
        }
        assert_eq!(cache.remove(&0), Some(0));
        assert_eq!(cache.remove(&0), None);
        cache.retain(|key, _| key % 2 == 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&2), None);
    }
}
