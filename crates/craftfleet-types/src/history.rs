//! Fleet event history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of entries the daemon retains.
pub const HISTORY_CAPACITY: usize = 50;

/// What produced a history entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// A command was accepted for an agent.
    Command,
    /// A chat line was seen by an agent.
    Chat,
    /// Lifecycle and configuration events.
    System,
    /// Session or connection failures.
    Error,
}

/// One entry in the fleet history, newest first when listed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: HistoryKind,
    pub message: String,
    /// Number of registered agents when the entry was recorded.
    pub fleet_size: usize,
}
