//! Lifecycle state machine.
//!
//! [`reduce`] maps one session event onto an agent record: the state to
//! move to and the side effects the runtime must carry out. It never touches
//! sessions, timers or counters itself.

use craftfleet_types::{AgentRecord, AgentState, HistoryKind};

use crate::session::SessionEvent;

/// A side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Say hello once the welcome delay has passed.
    ScheduleWelcome,
    /// Consult the reconnection policy.
    ScheduleReconnect,
    /// Increment the fleet error counter.
    CountError,
    /// Drop the session and invalidate in-flight work for it.
    DetachSession,
    History(HistoryKind, String),
}

/// Result of reducing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// New state, or `None` to keep the current one.
    pub next: Option<AgentState>,
    pub effects: Vec<Effect>,
}

/// Reduce a session event against the current record.
///
/// Returns `None` when the event does not apply in the record's state (for
/// example a kick while still connecting); such events change nothing.
pub fn reduce(record: &AgentRecord, event: &SessionEvent) -> Option<Transition> {
    let name = &record.name;
    let state = record.state;

    let (next, effects) = match event {
        SessionEvent::Spawned => (
            AgentState::Connected,
            vec![
                Effect::ScheduleWelcome,
                Effect::History(
                    HistoryKind::System,
                    format!("{name} spawned on {}", record.server),
                ),
            ],
        ),
        SessionEvent::Kicked { reason } => (
            AgentState::Kicked,
            vec![
                Effect::History(HistoryKind::System, format!("{name} was kicked: {reason}")),
                Effect::ScheduleReconnect,
            ],
        ),
        SessionEvent::Error { detail } => (
            AgentState::Error,
            vec![
                Effect::CountError,
                Effect::History(HistoryKind::Error, format!("{name}: {detail}")),
            ],
        ),
        SessionEvent::Died => (
            AgentState::Dead,
            vec![Effect::History(HistoryKind::System, format!("{name} died"))],
        ),
        SessionEvent::Ended { reason } => (
            AgentState::Disconnected,
            vec![
                Effect::DetachSession,
                Effect::History(
                    HistoryKind::System,
                    format!("{name} disconnected: {reason}"),
                ),
            ],
        ),
        SessionEvent::Chat { from, text } => {
            if from == name {
                return Some(Transition {
                    next: None,
                    effects: Vec::new(),
                });
            }
            return Some(Transition {
                next: None,
                effects: vec![Effect::History(HistoryKind::Chat, format!("<{from}> {text}"))],
            });
        }
    };

    if !state.can_transition_to(next) {
        return None;
    }
    Some(Transition {
        next: Some(next),
        effects,
    })
}
