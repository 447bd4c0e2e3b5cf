//! Deadline-guarded entry table.
//!
//! Each entry owns a one-shot `settled` flag and a timer task. Whichever of
//! [`DeadlineTable::settle`] and the timer wins the compare-and-swap on that
//! flag takes the entry; the loser does nothing. The table backs both the
//! command waiters and the idle-eviction grace timers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

struct Entry<V> {
    value: V,
    settled: Arc<AtomicBool>,
    timer: AbortHandle,
}

type Entries<K, V> = Mutex<HashMap<K, Entry<V>>>;

/// Shared table of entries that expire after a deadline.
///
/// Cloning yields another handle to the same table.
pub struct DeadlineTable<K, V> {
    inner: Arc<Entries<K, V>>,
}

impl<K, V> Clone for DeadlineTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for DeadlineTable<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> DeadlineTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, arming a timer that calls `on_expire`
    /// after `after` unless the entry is settled first.
    ///
    /// An existing entry under the same key is displaced without firing and
    /// returned. Must be called from within a tokio runtime.
    pub fn insert<F>(&self, key: K, value: V, after: Duration, on_expire: F) -> Option<V>
    where
        F: FnOnce(K, V) + Send + 'static,
    {
        let settled = Arc::new(AtomicBool::new(false));
        let timer_flag = Arc::clone(&settled);
        let table = Arc::downgrade(&self.inner);
        let timer_key = key.clone();
        let deadline = tokio::time::Instant::now() + after;

        let mut entries = self.inner.lock();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            expire(&table, timer_key, &timer_flag, on_expire);
        })
        .abort_handle();

        let displaced = entries.insert(
            key,
            Entry {
                value,
                settled,
                timer,
            },
        );
        drop(entries);

        displaced.and_then(Self::claim)
    }

    /// Take the entry under `key` if its deadline has not fired yet.
    ///
    /// Returns `None` when the key is unknown or the timer already won.
    pub fn settle<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.inner.lock();
        let won = entries.get(key).is_some_and(|e| try_settle(&e.settled));
        if !won {
            return None;
        }
        let entry = entries.remove(key)?;
        drop(entries);
        entry.timer.abort();
        Some(entry.value)
    }

    /// Remove the entry under `key` without firing its deadline.
    pub fn cancel<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.settle(key)
    }

    /// Settle and return every live entry.
    pub fn drain(&self) -> Vec<(K, V)> {
        let drained: Vec<(K, Entry<V>)> = self.inner.lock().drain().collect();
        drained
            .into_iter()
            .filter_map(|(key, entry)| Self::claim(entry).map(|value| (key, value)))
            .collect()
    }

    /// Whether a live entry exists under `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.lock().contains_key(key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the table has no live entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn claim(entry: Entry<V>) -> Option<V> {
        if try_settle(&entry.settled) {
            entry.timer.abort();
            Some(entry.value)
        } else {
            None
        }
    }
}

fn try_settle(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

fn expire<K, V, F>(table: &Weak<Entries<K, V>>, key: K, flag: &Arc<AtomicBool>, on_expire: F)
where
    K: Eq + Hash,
    F: FnOnce(K, V),
{
    if !try_settle(flag) {
        return;
    }
    let Some(table) = table.upgrade() else {
        return;
    };
    let mut entries = table.lock();
    // The slot may already hold a newer entry under the same key.
    let ours = entries
        .get(&key)
        .is_some_and(|e| Arc::ptr_eq(&e.settled, flag));
    if !ours {
        return;
    }
    let Some(entry) = entries.remove(&key) else {
        return;
    };
    drop(entries);
    on_expire(key, entry.value);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
