//! Bounded fleet history, newest first.

use std::collections::VecDeque;

use chrono::Utc;

use craftfleet_types::{HistoryEntry, HistoryKind, HISTORY_CAPACITY};

/// Ring buffer of history entries. New entries go to the head; the oldest
/// entry is evicted once the buffer is full.
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record an entry. Timestamps never go backwards from head to tail,
    /// even if the wall clock does.
    pub fn push(&mut self, kind: HistoryKind, message: impl Into<String>, fleet_size: usize) {
        let mut timestamp = Utc::now();
        if let Some(head) = self.entries.front() {
            timestamp = timestamp.max(head.timestamp);
        }
        self.entries.push_front(HistoryEntry {
            timestamp,
            kind,
            message: message.into(),
            fleet_size,
        });
        self.entries.truncate(self.capacity);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    #[cfg(test)]
    fn head(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
