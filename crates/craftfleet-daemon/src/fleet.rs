//! Fleet: the registry of agent slots, keyed by agent id.
//!
//! The fleet only answers questions about membership and capacity; the
//! runtime decides what to do with sessions. Slots are kept ordered by id so
//! listings are stable.

use std::collections::BTreeMap;

use craftfleet_types::{AgentId, AgentRecord, AgentState, FleetError};

use crate::slot::AgentSlot;

/// How a create request for an id would be admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The id is free.
    New,
    /// The id holds a record whose session is gone; it will be replaced.
    Supersede,
}

/// Registry of managed agent slots.
#[derive(Default)]
pub struct Fleet {
    slots: BTreeMap<AgentId, AgentSlot>,
    /// Highest id ever registered, for allocating fresh ids.
    high_water: AgentId,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `id` may be registered under a cap of `max_agents`.
    ///
    /// An id whose record is connecting or connected is taken. Any other
    /// record with that id is superseded, which does not grow the fleet.
    pub fn admit(&self, id: AgentId, max_agents: usize) -> Result<Admission, FleetError> {
        if let Some(slot) = self.slots.get(&id) {
            if slot.record.state.is_live() {
                return Err(FleetError::DuplicateId(id));
            }
            return Ok(Admission::Supersede);
        }
        if self.slots.len() >= max_agents {
            return Err(FleetError::CapacityExceeded { max: max_agents });
        }
        Ok(Admission::New)
    }

    /// Insert a slot, returning the one it replaced.
    pub fn insert(&mut self, slot: AgentSlot) -> Option<AgentSlot> {
        let id = slot.record.id;
        self.high_water = self.high_water.max(id);
        self.slots.insert(id, slot)
    }

    pub fn remove(&mut self, id: AgentId) -> Result<AgentSlot, FleetError> {
        self.slots.remove(&id).ok_or(FleetError::NotFound(id))
    }

    pub fn slot(&self, id: AgentId) -> Option<&AgentSlot> {
        self.slots.get(&id)
    }

    pub fn slot_mut(&mut self, id: AgentId) -> Option<&mut AgentSlot> {
        self.slots.get_mut(&id)
    }

    /// Snapshot of every record, ordered by id.
    pub fn records(&self) -> Vec<AgentRecord> {
        self.slots.values().map(|s| s.record.clone()).collect()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.slots.keys().copied().collect()
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut AgentSlot> {
        self.slots.values_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of agents in the `connected` state.
    pub fn connected_count(&self) -> usize {
        self.slots
            .values()
            .filter(|s| s.record.state == AgentState::Connected)
            .count()
    }

    /// An id above every id registered so far. Ids are never handed out twice.
    pub fn next_free_id(&self) -> Option<AgentId> {
        self.high_water.checked_add(1)
    }
}
