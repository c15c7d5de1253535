//! Admin allow-list and its change watcher.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Server-side admin allow-list, compared with the last announced copy on
/// a fixed interval.
#[derive(Debug, Clone)]
pub struct AdminList {
    current: BTreeSet<String>,
    announced: BTreeSet<String>,
    interval: Duration,
    next_check: Option<Instant>,
}

impl AdminList {
    /// Create an empty list checked every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            current: BTreeSet::new(),
            announced: BTreeSet::new(),
            interval,
            next_check: None,
        }
    }

    /// Replace the allow-list. Peers learn about it at the next check.
    pub fn set(&mut self, host_names: impl IntoIterator<Item = String>) {
        self.current = host_names.into_iter().collect();
    }

    /// Treat the current list as already announced and restart the interval.
    pub fn reset(&mut self) {
        self.announced = self.current.clone();
        self.next_check = None;
    }

    /// Whether `host_name` is on the list.
    pub fn contains(&self, host_name: &str) -> bool {
        self.current.contains(host_name)
    }

    /// Entries of the list.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.current.iter().map(String::as_str)
    }

    /// Run the periodic comparison. Returns `true` once per interval in
    /// which the list differs from the last announced copy.
    pub fn poll_changed_at(&mut self, now: Instant) -> bool {
        let due = *self.next_check.get_or_insert(now + self.interval);
        if now < due {
            return false;
        }
        self.next_check = Some(now + self.interval);
        if self.current == self.announced {
            return false;
        }
        self.announced = self.current.clone();
        true
    }
}
