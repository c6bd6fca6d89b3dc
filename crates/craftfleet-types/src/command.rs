//! Fleet commands and their results.
//!
//! Callers address commands by kind name plus a JSON parameter object
//! (`"move"`, `{"x": 10, "y": 64, "z": -3}`). [`Command::parse`] turns that
//! pair into a typed [`Command`] before anything touches the fleet, so an
//! unknown kind or malformed parameters never has side effects.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// Every command kind the dispatcher understands.
pub const COMMAND_KINDS: &[&str] = &[
    "chat",
    "move",
    "follow",
    "stop",
    "jump",
    "look",
    "inventory",
    "attack",
];

/// A validated command for a single agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a chat line verbatim.
    Chat { message: String },
    /// Walk to within a fixed radius of a point and wait until arrival.
    Move { x: f64, y: f64, z: f64 },
    /// Keep following a visible player.
    Follow { player: String },
    /// Cancel any active motion goal.
    Stop,
    /// Press jump briefly.
    Jump,
    /// Turn the head. Missing angles are randomized.
    Look { yaw: Option<f64>, pitch: Option<f64> },
    /// Read held items.
    Inventory,
    /// Attack a visible entity by name.
    Attack { target: String },
}

#[derive(Deserialize)]
struct ChatParams {
    message: String,
}

#[derive(Deserialize)]
struct MoveParams {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Deserialize)]
struct FollowParams {
    player: String,
}

#[derive(Deserialize)]
struct LookParams {
    #[serde(default)]
    yaw: Option<f64>,
    #[serde(default)]
    pitch: Option<f64>,
}

#[derive(Deserialize)]
struct AttackParams {
    target: String,
}

fn params_as<T: DeserializeOwned>(kind: &str, params: serde_json::Value) -> Result<T, FleetError> {
    let params = match params {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        serde_json::Value::Object(map) => serde_json::Value::Object(map),
        other => {
            return Err(FleetError::InvalidParams(format!(
                "{kind}: expected an object, got {other}"
            )))
        }
    };
    serde_json::from_value(params).map_err(|e| FleetError::InvalidParams(format!("{kind}: {e}")))
}

fn non_empty(kind: &str, field: &str, value: String) -> Result<String, FleetError> {
    if value.trim().is_empty() {
        return Err(FleetError::InvalidParams(format!("{kind}: {field} must not be empty")));
    }
    Ok(value)
}

impl Command {
    /// Parse a command kind and its parameters.
    ///
    /// Fails with `UnknownCommand` for kinds outside [`COMMAND_KINDS`] and
    /// `InvalidParams` when required fields are missing or ill-typed.
    pub fn parse(kind: &str, params: serde_json::Value) -> Result<Self, FleetError> {
        let kind = kind.trim();
        let command = match kind {
            "chat" => {
                let p: ChatParams = params_as(kind, params)?;
                Command::Chat {
                    message: non_empty(kind, "message", p.message)?,
                }
            }
            "move" => {
                let p: MoveParams = params_as(kind, params)?;
                if ![p.x, p.y, p.z].iter().all(|v| v.is_finite()) {
                    return Err(FleetError::InvalidParams(
                        "move: coordinates must be finite".into(),
                    ));
                }
                Command::Move { x: p.x, y: p.y, z: p.z }
            }
            "follow" => {
                let p: FollowParams = params_as(kind, params)?;
                Command::Follow {
                    player: non_empty(kind, "player", p.player)?,
                }
            }
            "stop" => Command::Stop,
            "jump" => Command::Jump,
            "look" => {
                let p: LookParams = params_as(kind, params)?;
                Command::Look {
                    yaw: p.yaw,
                    pitch: p.pitch,
                }
            }
            "inventory" => Command::Inventory,
            "attack" => {
                let p: AttackParams = params_as(kind, params)?;
                Command::Attack {
                    target: non_empty(kind, "target", p.target)?,
                }
            }
            other => return Err(FleetError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    /// The kind name this command was parsed from.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Chat { .. } => "chat",
            Command::Move { .. } => "move",
            Command::Follow { .. } => "follow",
            Command::Stop => "stop",
            Command::Jump => "jump",
            Command::Look { .. } => "look",
            Command::Inventory => "inventory",
            Command::Attack { .. } => "attack",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Chat { message } => write!(f, "chat {message}"),
            Command::Move { x, y, z } => write!(f, "move {x} {y} {z}"),
            Command::Follow { player } => write!(f, "follow {player}"),
            Command::Stop => f.write_str("stop"),
            Command::Jump => f.write_str("jump"),
            Command::Look {
                yaw: Some(yaw),
                pitch: Some(pitch),
            } => write!(f, "look {yaw:.2} {pitch:.2}"),
            Command::Look { .. } => f.write_str("look"),
            Command::Inventory => f.write_str("inventory"),
            Command::Attack { target } => write!(f, "attack {target}"),
        }
    }
}

/// Outcome of executing one command against one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    /// Error code (see [`FleetError::code`]) when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured payload, e.g. the item list of an inventory query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            data: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(message)
        }
    }

    pub fn failed(error: &FleetError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            error: Some(error.code().to_string()),
            data: None,
        }
    }
}
