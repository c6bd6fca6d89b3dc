//! Aggregate fleet statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time statistics for the whole fleet.
///
/// `active` and `fleet_size` are computed from the registry when the
/// snapshot is taken; the other counters only ever grow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetStats {
    pub start_time: DateTime<Utc>,
    pub uptime_secs: u64,
    /// Sessions requested since start, including reconnections.
    pub total_created: u64,
    /// Agents currently in the `connected` state.
    pub active: usize,
    /// Agents currently registered, in any state.
    pub fleet_size: usize,
    pub messages_sent: u64,
    pub movements: u64,
    pub errors: u64,
    pub commands_executed: u64,
}
