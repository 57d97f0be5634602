//! Capacity-bounded counter store.
//!
//! Maps a client key to a fixed-window [`CounterRecord`]. The store is an LRU
//! cache bounded by entry count and by an estimated byte size; every record
//! also carries a TTL measured from its last write. Eviction can only make
//! admission more permissive: an evicted client simply starts a new window.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::metrics::STORE_EVICTIONS;

/// Fixed cost of one record: 4 bytes of count plus 8 bytes of expiry.
pub const RECORD_OVERHEAD: usize = 12;

// Estimated footprint of a record stored under `key`
pub fn record_size(key: &str) -> usize {
    RECORD_OVERHEAD + key.chars().count() * 2
}

/// Bounds shared by a store and all of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub max_entries: usize,
    /// Upper bound on the summed [`record_size`] of all records.
    pub max_total_size: usize,
    /// Records not written for this long are dropped. A store never uses a
    /// TTL shorter than its own window.
    pub ttl: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            max_total_size: 50_000_000,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    pub count: u64,
    pub window_expires_at: Instant,
}

impl CounterRecord {
    pub fn resets_in(&self, now: Instant) -> Duration {
        self.window_expires_at.saturating_duration_since(now)
    }
}

/// Per-route adjustments applied by [`CounterStore::child`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOverrides {
    pub window: Option<Duration>,
}

struct Slot {
    record: CounterRecord,
    size: usize,
    written_at: Instant,
    tick: u64,
}

// Records plus their recency order (lowest tick = least recently used)
#[derive(Default)]
struct LruMap {
    slots: HashMap<String, Slot>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    total_size: usize,
}

impl LruMap {
    fn insert(&mut self, key: String, record: CounterRecord, size: usize, now: Instant) {
        self.remove(&key);

        let tick = self.next_tick;
        self.next_tick += 1;
        self.recency.insert(tick, key.clone());
        self.total_size += size;
        self.slots.insert(
            key,
            Slot {
                record,
                size,
                written_at: now,
                tick,
            },
        );
    }

    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.tick);
        self.total_size -= slot.size;
        Some(slot)
    }

    fn pop_least_recent(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        if let Some(slot) = self.slots.remove(&key) {
            self.total_size -= slot.size;
        }
        Some(key)
    }
}

/// In-memory LRU store of per-client window counters.
pub struct CounterStore {
    options: Arc<StoreOptions>,
    window: Duration,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    map: Mutex<LruMap>,
}

impl CounterStore {
    /// Creates an empty store. A missing or zero window, or zero bounds, is a
    /// configuration error.
    pub fn new(
        options: StoreOptions,
        window: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if options.max_entries == 0 {
            return Err(ConfigError::ZeroCapacity("entry limit"));
        }
        if options.max_total_size == 0 {
            return Err(ConfigError::ZeroCapacity("size limit"));
        }
        if options.ttl.is_zero() {
            return Err(ConfigError::ZeroCapacity("entry ttl"));
        }

        let window = validate_window(window)?;

        Ok(Self {
            ttl: options.ttl.max(window),
            window,
            options: Arc::new(options),
            clock,
            map: Mutex::new(LruMap::default()),
        })
    }

    /// New store with the same bounds and clock but its own empty map.
    pub fn child(&self, overrides: StoreOverrides) -> Result<Self, ConfigError> {
        let window = validate_window(overrides.window.or(Some(self.window)))?;

        Ok(Self {
            ttl: self.options.ttl.max(window),
            options: Arc::clone(&self.options),
            window,
            clock: Arc::clone(&self.clock),
            map: Mutex::new(LruMap::default()),
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Idle lifetime of a record, at least one window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Counts one request for `key` and returns the updated record.
    ///
    /// An absent or expired record starts a new window with `count = 1`;
    /// a live one is bumped and keeps its expiry.
    pub fn increment(&self, key: &str) -> CounterRecord {
        let now = self.clock.now();
        let mut map = self.map.lock();

        let live = map
            .slots
            .get(key)
            .filter(|slot| self.is_live(slot, now))
            .map(|slot| slot.record);

        let record = match live {
            Some(mut record) => {
                record.count = record.count.saturating_add(1);
                record
            }
            None => CounterRecord {
                count: 1,
                window_expires_at: now + self.window,
            },
        };

        let size = record_size(key);
        if size > self.options.max_total_size {
            // Too large to ever fit; count it without retaining it.
            map.remove(key);
            debug!(size, "counter record exceeds store size limit, not retained");
            return record;
        }

        map.insert(key.to_string(), record, size, now);

        let mut evicted = 0u64;
        while map.slots.len() > self.options.max_entries
            || map.total_size > self.options.max_total_size
        {
            match map.pop_least_recent() {
                Some(victim) => {
                    debug!(key = %victim, "evicted counter record");
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            STORE_EVICTIONS.inc_by(evicted);
        }

        record
    }

    /// Reads the live record for `key` without touching its recency.
    pub fn peek(&self, key: &str) -> Option<CounterRecord> {
        let now = self.clock.now();
        self.map
            .lock()
            .slots
            .get(key)
            .filter(|slot| self.is_live(slot, now))
            .map(|slot| slot.record)
    }

    /// Drops every record whose window or TTL has run out.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.map.lock();

        let stale: Vec<String> = map
            .slots
            .iter()
            .filter(|(_, slot)| !self.is_live(slot, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            map.remove(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.map.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size(&self) -> usize {
        self.map.lock().total_size
    }

    fn is_live(&self, slot: &Slot, now: Instant) -> bool {
        slot.record.window_expires_at > now
            && now.saturating_duration_since(slot.written_at) < self.ttl
    }
}

fn validate_window(window: Option<Duration>) -> Result<Duration, ConfigError> {
    match window {
        None => Err(ConfigError::MissingWindow),
        Some(window) if window.is_zero() => Err(ConfigError::ZeroWindow),
        Some(window) => Ok(window),
    }
}
