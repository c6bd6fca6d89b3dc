//! Agent slot: runtime state for a single supervised agent.
//!
//! Each agent in the fleet gets an `AgentSlot` holding its public record,
//! the session currently attached to it, and the generation that tags every
//! message produced on behalf of that session. Messages carrying an older
//! generation are stale and must not touch the slot.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use craftfleet_types::{Activity, AgentRecord, AgentState};

use crate::session::AgentSession;

/// Runtime state for a single agent in the fleet.
pub struct AgentSlot {
    /// Public metadata mirrored from the session.
    pub record: AgentRecord,
    /// Generation of the current (or pending) session.
    pub generation: u64,
    /// Attached session, once the connector has produced one.
    session: Option<Arc<dyn AgentSession>>,
    /// Task forwarding session events into the runtime.
    pump: Option<JoinHandle<()>>,
    /// Bumped on every activity change; timed resets carry the token they
    /// were scheduled under.
    activity_token: u64,
    /// Token of the respawn timer pending for this slot, if any.
    pending_respawn: Option<u64>,
}

impl AgentSlot {
    pub fn new(record: AgentRecord, generation: u64) -> Self {
        Self {
            record,
            generation,
            session: None,
            pump: None,
            activity_token: 0,
            pending_respawn: None,
        }
    }

    pub fn session(&self) -> Option<Arc<dyn AgentSession>> {
        self.session.clone()
    }

    /// Attach a session and the task pumping its events.
    pub fn attach(&mut self, session: Arc<dyn AgentSession>, pump: JoinHandle<()>) {
        if let Some(old) = self.pump.replace(pump) {
            old.abort();
        }
        self.session = Some(session);
    }

    /// Drop the session and stop its event pump. Returns the session so the
    /// caller can disconnect it.
    pub fn detach(&mut self) -> Option<Arc<dyn AgentSession>> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.record.connected_at = None;
        self.set_activity(Activity::Idle);
        self.session.take()
    }

    /// Whether a command may be dispatched to this agent.
    pub fn is_commandable(&self) -> bool {
        self.session.is_some() && self.record.state != AgentState::Disconnected
    }

    /// Move the record to `next` if the edge is legal.
    pub fn transition(&mut self, next: AgentState) -> bool {
        let current = self.record.state;
        if current.can_transition_to(next) {
            self.record.state = next;
            true
        } else {
            debug!(
                agent = self.record.id,
                from = %current,
                to = %next,
                "ignoring illegal state transition"
            );
            false
        }
    }

    /// Remember `token` as the respawn timer now pending for this slot.
    pub fn arm_respawn(&mut self, token: u64) {
        self.pending_respawn = Some(token);
    }

    /// Consume the pending respawn if `token` is the one armed.
    pub fn take_respawn(&mut self, token: u64) -> bool {
        if self.pending_respawn != Some(token) {
            return false;
        }
        self.pending_respawn = None;
        true
    }

    /// Set the activity and return the token identifying this change.
    pub fn set_activity(&mut self, activity: Activity) -> u64 {
        self.activity_token += 1;
        self.record.activity = activity;
        self.activity_token
    }

    /// Reset to idle unless the activity changed since `token` was issued.
    pub fn reset_activity_if(&mut self, token: u64) -> bool {
        if self.activity_token != token {
            return false;
        }
        self.set_activity(Activity::Idle);
        true
    }
}
