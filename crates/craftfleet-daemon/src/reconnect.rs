//! Reconnection policy for kicked agents.
//!
//! A kick triggers at most one reconnection attempt after a fixed delay.
//! There is no backoff and no retry counting: if the attempt fails the agent
//! stays in `error` until someone recreates it.

use std::time::Duration;

use craftfleet_types::{AgentState, ServerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before reconnecting after a kick, or `None` when disabled.
    pub fn on_kick(&self, server: &ServerConfig) -> Option<Duration> {
        server.auto_reconnect.then_some(self.delay)
    }

    /// Whether a scheduled respawn should still go ahead.
    ///
    /// `None` means the agent was removed in the meantime and must not come
    /// back. A live agent was already recreated by someone else.
    pub fn should_respawn(state: Option<AgentState>) -> bool {
        matches!(state, Some(state) if !state.is_live())
    }
}
