//! Core types shared across all craftfleet crates.
//!
//! Defines agent records, fleet commands, history and stats snapshots,
//! configuration, and the error taxonomy used by the fleet daemon, the
//! control protocol, and the CLI.

pub mod agent;
pub mod command;
pub mod config;
pub mod error;
pub mod history;
pub mod stats;

pub use agent::{Activity, AgentId, AgentRecord, AgentState, InventoryItem, Position};
pub use command::{Command, CommandResult};
pub use config::{
    AgentSeed, ApiConfig, ControlConfig, FleetConfig, ServerConfig, SimEntityConfig, SimulationConfig,
    TimingsConfig, CONFIG_FILENAME, SERVER_CONFIG_FILENAME,
};
pub use error::{FleetError, SessionError};
pub use history::{HistoryEntry, HistoryKind, HISTORY_CAPACITY};
pub use stats::FleetStats;
