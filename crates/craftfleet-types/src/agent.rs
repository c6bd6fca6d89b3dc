//! Agent records and their lifecycle states.
//!
//! An [`AgentRecord`] mirrors the state of one supervised session so that
//! callers can read it without touching the session itself. Only the fleet
//! runtime writes to records, in response to session events or command
//! results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

/// Caller-assigned agent identifier, unique while the agent is registered.
pub type AgentId = u32;

/// Lifecycle state of a single agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Session requested, not yet spawned in the world.
    Connecting,
    /// Spawned and accepting commands.
    Connected,
    /// Removed from the server by a kick.
    Kicked,
    /// The session reported an error.
    Error,
    /// The agent died in the world and was not respawned.
    Dead,
    /// The session ended; no commands can target it.
    Disconnected,
}

impl AgentState {
    /// Whether moving from `self` to `next` is a legal lifecycle edge.
    ///
    /// `connecting -> connected -> {kicked, dead}`, any state may move to
    /// `error` or `disconnected`, and every state except `connected` and
    /// `connecting` may re-enter `connecting` through a reconnection.
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        match (self, next) {
            (Connecting, Connected) => true,
            (Connected, Kicked | Dead) => true,
            (_, Error | Disconnected) => true,
            (Kicked | Error | Dead | Disconnected, Connecting) => true,
            _ => false,
        }
    }

    /// Whether a session for this state is live or about to be.
    pub fn is_live(self) -> bool {
        matches!(self, AgentState::Connecting | AgentState::Connected)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Connecting => "connecting",
            AgentState::Connected => "connected",
            AgentState::Kicked => "kicked",
            AgentState::Error => "error",
            AgentState::Dead => "dead",
            AgentState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// A point in world coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}, {:.1}, {:.1}", self.x, self.y, self.z)
    }
}

/// Short-lived tag describing what an agent is doing because of a command.
///
/// Serialized as its display string (`"idle"`, `"following Steve"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Activity {
    #[default]
    Idle,
    Moving,
    Jumping,
    Looking,
    Following(String),
    Attacking(String),
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Idle => f.write_str("idle"),
            Activity::Moving => f.write_str("moving"),
            Activity::Jumping => f.write_str("jumping"),
            Activity::Looking => f.write_str("looking"),
            Activity::Following(player) => write!(f, "following {player}"),
            Activity::Attacking(target) => write!(f, "attacking {target}"),
        }
    }
}

impl FromStr for Activity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => return Ok(Activity::Idle),
            "moving" => return Ok(Activity::Moving),
            "jumping" => return Ok(Activity::Jumping),
            "looking" => return Ok(Activity::Looking),
            _ => {}
        }
        if let Some(player) = s.strip_prefix("following ") {
            return Ok(Activity::Following(player.to_string()));
        }
        if let Some(target) = s.strip_prefix("attacking ") {
            return Ok(Activity::Attacking(target.to_string()));
        }
        Err(format!("unknown activity: {s:?}"))
    }
}

impl From<Activity> for String {
    fn from(activity: Activity) -> Self {
        activity.to_string()
    }
}

impl TryFrom<String> for Activity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One held item, as reported by an inventory query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    pub name: String,
    pub count: u32,
}

/// Per-agent metadata owned by the fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub state: AgentState,
    pub position: Position,
    pub health: f32,
    pub food: f32,
    pub activity: Activity,
    /// When the agent last spawned. Cleared when its session goes away.
    pub connected_at: Option<DateTime<Utc>>,
    /// Target server as `host:port`.
    pub server: String,
    /// Display form of the last command accepted for this agent.
    pub last_command: Option<String>,
}

impl AgentRecord {
    /// Create a record in the `connecting` state for the given server.
    pub fn new(id: AgentId, name: impl Into<String>, server: &ServerConfig) -> Self {
        Self {
            id,
            name: name.into(),
            state: AgentState::Connecting,
            position: Position::default(),
            health: 0.0,
            food: 0.0,
            activity: Activity::Idle,
            connected_at: None,
            server: server.address(),
            last_command: None,
        }
    }
}
