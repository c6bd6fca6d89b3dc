//! Agent session boundary.
//!
//! The fleet never speaks the game protocol itself. A [`SessionConnector`]
//! opens one [`AgentSession`] per agent and hands back the stream of
//! lifecycle events that session produces. Everything the dispatcher does to
//! an agent goes through this trait object.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use craftfleet_types::{InventoryItem, Position, ServerConfig, SessionError};

/// A visible entity, as resolved by [`AgentSession::find_entity_by_name`].
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u64,
    pub name: String,
    pub position: Position,
}

/// Momentary movement controls the dispatcher toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlState {
    Jump,
}

/// Position and vitals read from a live session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vitals {
    pub position: Position,
    pub health: f32,
    pub food: f32,
}

/// Lifecycle events emitted by a session, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The agent entered the world.
    Spawned,
    /// A chat line was received.
    Chat { from: String, text: String },
    /// The server removed the agent.
    Kicked { reason: String },
    /// The protocol client reported a failure.
    Error { detail: String },
    /// The agent died in the world.
    Died,
    /// The connection is gone. No further events follow.
    Ended { reason: String },
}

/// A connected (or connecting) agent.
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Send a chat line verbatim.
    async fn chat(&self, message: &str) -> Result<(), SessionError>;

    /// Walk to within `radius` of `target`.
    ///
    /// Resolves when the goal is reached. A goal replaced by a newer one, or
    /// cleared by [`cancel_goal`](Self::cancel_goal), resolves with
    /// [`SessionError::GoalCancelled`].
    async fn set_motion_goal(&self, target: Position, radius: f64) -> Result<(), SessionError>;

    /// Keep within `radius` of a moving entity. Returns once the goal is set.
    async fn set_follow_goal(&self, entity: &Entity, radius: f64) -> Result<(), SessionError>;

    /// Clear any active motion or follow goal.
    fn cancel_goal(&self);

    async fn set_control_state(&self, control: ControlState, active: bool)
        -> Result<(), SessionError>;

    /// Turn the head. Angles are in radians.
    async fn look(&self, yaw: f64, pitch: f64) -> Result<(), SessionError>;

    async fn query_inventory(&self) -> Result<Vec<InventoryItem>, SessionError>;

    /// Nearest visible entity with exactly this name.
    fn find_entity_by_name(&self, name: &str) -> Option<Entity>;

    async fn attack(&self, entity: &Entity) -> Result<(), SessionError>;

    /// Current position and vitals. Never blocks.
    fn vitals(&self) -> Vitals;

    /// Close the connection. The session emits [`SessionEvent::Ended`].
    async fn disconnect(&self, reason: &str) -> Result<(), SessionError>;
}

/// A freshly opened session and its event stream.
pub struct SessionHandle {
    pub session: Arc<dyn AgentSession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Opens sessions against a target server.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, server: &ServerConfig, name: &str)
        -> Result<SessionHandle, SessionError>;
}
