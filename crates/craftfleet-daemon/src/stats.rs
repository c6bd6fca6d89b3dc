//! Fleet counters.

use chrono::{DateTime, Utc};

use craftfleet_types::FleetStats;

use crate::dispatch::Counter;
use crate::fleet::Fleet;

/// Monotonic counters owned by the runtime. `active` and `fleet_size` are
/// not stored; they are read from the registry when a snapshot is taken.
#[derive(Debug, Clone)]
pub struct StatsCounters {
    pub start_time: DateTime<Utc>,
    pub total_created: u64,
    pub messages_sent: u64,
    pub movements: u64,
    pub errors: u64,
    pub commands_executed: u64,
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            total_created: 0,
            messages_sent: 0,
            movements: 0,
            errors: 0,
            commands_executed: 0,
        }
    }
}

impl StatsCounters {
    pub fn credit(&mut self, counter: Counter) {
        match counter {
            Counter::MessagesSent => self.messages_sent += 1,
            Counter::Movements => self.movements += 1,
        }
    }

    pub fn snapshot(&self, fleet: &Fleet) -> FleetStats {
        let uptime = Utc::now().signed_duration_since(self.start_time);
        FleetStats {
            start_time: self.start_time,
            uptime_secs: u64::try_from(uptime.num_seconds()).unwrap_or(0),
            total_created: self.total_created,
            active: fleet.connected_count(),
            fleet_size: fleet.len(),
            messages_sent: self.messages_sent,
            movements: self.movements,
            errors: self.errors,
            commands_executed: self.commands_executed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftfleet_types::{AgentRecord, AgentState, ServerConfig};

    use crate::slot::AgentSlot;

    #[test]
    fn active_comes_from_the_registry() {
        let mut fleet = Fleet::new();
        for (id, state) in [
            (1, AgentState::Connected),
            (2, AgentState::Connected),
            (3, AgentState::Kicked),
        ] {
            let mut record = AgentRecord::new(id, format!("Bot_{id}"), &ServerConfig::default());
            record.state = state;
            fleet.insert(AgentSlot::new(record, 1));
        }

        let mut counters = StatsCounters::default();
        counters.credit(Counter::Movements);
        counters.credit(Counter::MessagesSent);
        counters.credit(Counter::MessagesSent);

        let stats = counters.snapshot(&fleet);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.fleet_size, 3);
        assert_eq!(stats.movements, 1);
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.errors, 0);
    }
}
