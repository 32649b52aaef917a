//! Traffic-based online inference.

use std::collections::HashMap;

use lunet_core::defaults::{
    DEFAULT_ACTIVITY_WINDOW_SECS, DEFAULT_ONLINE_TRACKER_CAPACITY,
    DEFAULT_ONLINE_TRACKER_RETENTION_SECS, MIN_ACTIVITY_WINDOW_SECS,
};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Seconds after the last traffic increase during which an identity
    /// counts as online. Clamped to at least 15.
    pub activity_window_secs: u64,
    /// Maximum tracked identities.
    pub capacity: usize,
    /// Entries not observed for this long are evicted first.
    pub retention_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            activity_window_secs: DEFAULT_ACTIVITY_WINDOW_SECS,
            capacity: DEFAULT_ONLINE_TRACKER_CAPACITY,
            retention_secs: DEFAULT_ONLINE_TRACKER_RETENTION_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_total: i64,
    last_active: Option<u64>,
    last_seen: u64,
}

/// Per-identity inference state, bounded in size.
///
/// Not persisted. The first observation of an identity with non-zero
/// traffic counts as activity, so a restart does not report everyone
/// offline for one window.
#[derive(Debug)]
pub struct OnlineTracker {
    window_secs: u64,
    capacity: usize,
    retention_secs: u64,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for OnlineTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl OnlineTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            window_secs: config.activity_window_secs.max(MIN_ACTIVITY_WINDOW_SECS),
            capacity: config.capacity.max(1),
            retention_secs: config.retention_secs,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Effective activity window in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Fold in the cumulative total of `identity` seen at `now` (unix
    /// seconds) and return whether it is online.
    pub fn observe(&self, identity: &str, total: i64, now: u64) -> bool {
        let mut entries = self.entries.lock();
        let entry = match entries.get_mut(identity) {
            Some(entry) => {
                // a lower total is an upstream reset; any traffic since counts
                let increased = total > entry.last_total || (total < entry.last_total && total > 0);
                if increased {
                    entry.last_active = Some(now);
                }
                entry.last_total = total;
                entry.last_seen = now;
                *entry
            }
            None => {
                if entries.len() >= self.capacity {
                    self.evict(&mut entries, now);
                }
                let entry = Entry {
                    last_total: total,
                    last_active: (total > 0).then_some(now),
                    last_seen: now,
                };
                entries.insert(identity.to_string(), entry);
                entry
            }
        };
        lunet_metrics::set_online_tracker_entries(entries.len());
        self.is_active(&entry, now)
    }

    /// Online state from what was already observed, without new data.
    ///
    /// `None` when the identity was never observed.
    pub fn last_known(&self, identity: &str, now: u64) -> Option<bool> {
        self.entries
            .lock()
            .get(identity)
            .map(|entry| self.is_active(entry, now))
    }

    /// Drop entries not observed within the retention age.
    pub fn prune(&self, now: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let retention = self.retention_secs;
        entries.retain(|_, e| now.saturating_sub(e.last_seen) <= retention);
        lunet_metrics::set_online_tracker_entries(entries.len());
        before - entries.len()
    }

    fn is_active(&self, entry: &Entry, now: u64) -> bool {
        entry
            .last_active
            .is_some_and(|t| now.saturating_sub(t) <= self.window_secs)
    }

    fn evict(&self, entries: &mut HashMap<String, Entry>, now: u64) {
        let retention = self.retention_secs;
        entries.retain(|_, e| now.saturating_sub(e.last_seen) <= retention);
        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
