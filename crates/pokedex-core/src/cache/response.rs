use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Smallest sweep period we will schedule. `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Longest sweep period. Larger values overflow the timer's deadline.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

type Entries = Mutex<HashMap<String, CacheEntry>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    created_at: Instant,
}

impl CacheEntry {
    fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

/// Aborts the sweep task once the last cache handle goes away.
#[derive(Debug)]
struct Reaper {
    handle: JoinHandle<()>,
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Thread-safe URL → response-body cache with time-based expiry.
///
/// Lookups do not check age: an entry stays visible until the next sweep
/// removes it, so a hit may be up to `2 * ttl` old. Every miss must be
/// satisfiable by going back to the network, so callers never depend on
/// what is or is not cached.
///
/// Clone is cheap and clones share the same entries and sweep task.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<Entries>,
    _reaper: Arc<Reaper>,
}

impl ResponseCache {
    /// Create an empty cache and start its sweep task.
    ///
    /// The sweep wakes every `ttl` and removes entries older than `ttl`.
    /// A `ttl` above `MAX_SWEEP_INTERVAL` is capped to it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(ttl: Duration) -> Self {
        let entries: Arc<Entries> = Arc::new(Mutex::new(HashMap::new()));
        let ttl = ttl.min(MAX_SWEEP_INTERVAL);
        let period = ttl.max(MIN_SWEEP_INTERVAL);
        let handle = tokio::spawn(reap_loop(Arc::downgrade(&entries), ttl, period));

        debug!(ttl_ms = ttl.as_millis() as u64, "Response cache created");

        Self {
            entries,
            _reaper: Arc::new(Reaper { handle }),
        }
    }

    /// Store `value` under `key`, replacing any previous entry and its timestamp.
    pub fn add(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        trace!(key = %key, "Cache add");
        lock(&self.entries).insert(key, CacheEntry::new(value.into()));
    }

    /// Look up `key`. A miss is `None` and changes nothing.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let hit = lock(&self.entries).get(key).map(|entry| entry.value.clone());
        trace!(key = %key, hit = hit.is_some(), "Cache lookup");
        hit
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    // A panic while holding the lock cannot leave a half-written entry behind,
    // so the map is still usable.
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn reap_loop(entries: Weak<Entries>, ttl: Duration, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(entries) = entries.upgrade() else {
            return;
        };
        reap(&entries, ttl, Instant::now());
    }
}

/// Remove every entry created more than `ttl` before `now`.
fn reap(entries: &Entries, ttl: Duration, now: Instant) -> usize {
    let mut map = lock(entries);
    let before = map.len();
    map.retain(|_, entry| !entry.is_expired(now, ttl));
    let removed = before - map.len();
    if removed > 0 {
        debug!(removed, remaining = map.len(), "Reaped expired cache entries");
    }
    removed
}

// ============================================================================
// Tests
// ============================================================================
