//! Configuration types for the craftfleet daemon.
//!
//! The daemon reads `~/.craftfleet/craftfleet.toml` at startup. The
//! `[server]` table is the target server every agent connects to; the config
//! manager persists replacements of it to `server.toml` next to the daemon
//! config so they survive a restart.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, InventoryItem};
use crate::error::FleetError;

/// Name of the daemon configuration file.
pub const CONFIG_FILENAME: &str = "craftfleet.toml";

/// Name of the persisted server config file.
pub const SERVER_CONFIG_FILENAME: &str = "server.toml";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetConfig {
    /// Target server every agent connects to.
    #[serde(default)]
    pub server: ServerConfig,
    /// Unix control socket settings.
    #[serde(default)]
    pub control: ControlConfig,
    /// JSON HTTP API settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Delays used by the lifecycle and reconnection logic.
    #[serde(default)]
    pub timings: TimingsConfig,
    /// Agents to create when the daemon starts.
    #[serde(default)]
    pub agents: Vec<AgentSeed>,
    /// Settings for the built-in simulated session backend.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Target server settings. Replaced as a whole, never edited in place.
///
/// `host`, `port` and `protocol_version` have no serde defaults: a config
/// update that omits them is rejected rather than silently filled in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Game protocol version string handed to the session library.
    pub protocol_version: String,
    /// Prefix for generated agent names (`<prefix><id>`).
    #[serde(default = "default_name_prefix")]
    pub agent_name_prefix: String,
    /// Maximum number of registered agents.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Whether kicked agents are reconnected once after a delay.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 25565,
            protocol_version: "1.20.1".into(),
            agent_name_prefix: default_name_prefix(),
            max_agents: default_max_agents(),
            auto_reconnect: true,
        }
    }
}

impl ServerConfig {
    /// `host:port` form stored on agent records.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default name for an agent created without one.
    pub fn agent_name(&self, id: AgentId) -> String {
        format!("{}{id}", self.agent_name_prefix)
    }

    /// Reject configs that could not possibly connect anywhere.
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.host.trim().is_empty() {
            return Err(FleetError::ConfigInvalid("host is required".into()));
        }
        if self.port == 0 {
            return Err(FleetError::ConfigInvalid("port is required".into()));
        }
        if self.protocol_version.trim().is_empty() {
            return Err(FleetError::ConfigInvalid("protocol version is required".into()));
        }
        if self.max_agents == 0 {
            return Err(FleetError::ConfigInvalid("max_agents must be at least 1".into()));
        }
        Ok(())
    }

    /// Parse and validate a server config from untrusted JSON.
    pub fn from_json(value: serde_json::Value) -> Result<Self, FleetError> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| FleetError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, FleetError> {
        let config: Self =
            toml::from_str(content).map_err(|e| FleetError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, FleetError> {
        toml::to_string_pretty(self)
            .map_err(|e| FleetError::Persistence(format!("failed to serialize server config: {e}")))
    }
}

/// Control socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

/// JSON HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_api_listen(),
        }
    }
}

/// Fixed delays of the lifecycle, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingsConfig {
    /// Delay between spawning and the welcome chat line.
    #[serde(default = "default_welcome_delay_ms")]
    pub welcome_delay_ms: u64,
    /// Delay between a kick and the single reconnection attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Delay between tearing a session down for a server change and
    /// recreating it against the new server.
    #[serde(default = "default_migration_delay_ms")]
    pub migration_delay_ms: u64,
    /// Interval of the vitals refresh for connected agents.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            welcome_delay_ms: default_welcome_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            migration_delay_ms: default_migration_delay_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl TimingsConfig {
    pub fn welcome_delay(&self) -> Duration {
        Duration::from_millis(self.welcome_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn migration_delay(&self) -> Duration {
        Duration::from_millis(self.migration_delay_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

/// An agent created at daemon startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSeed {
    pub id: AgentId,
    #[serde(default)]
    pub name: Option<String>,
}

/// A named entity visible to every simulated agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimEntityConfig {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Settings for the built-in simulated session backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// Delay between connecting and the spawn event.
    #[serde(default = "default_spawn_delay_ms")]
    pub spawn_delay_ms: u64,
    /// Walking speed used to compute travel time for motion goals.
    #[serde(default = "default_speed")]
    pub blocks_per_sec: f64,
    /// Items every simulated agent starts with.
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    /// Entities every simulated agent can see.
    #[serde(default)]
    pub entities: Vec<SimEntityConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            spawn_delay_ms: default_spawn_delay_ms(),
            blocks_per_sec: default_speed(),
            inventory: Vec::new(),
            entities: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_name_prefix() -> String {
    "Bot_".to_string()
}

fn default_max_agents() -> usize {
    20
}

fn default_api_listen() -> String {
    "127.0.0.1:9850".to_string()
}

fn default_socket_path() -> PathBuf {
    fleet_dir().join("craftfleet.sock")
}

fn default_welcome_delay_ms() -> u64 {
    2_000
}

fn default_reconnect_delay_ms() -> u64 {
    10_000
}

fn default_migration_delay_ms() -> u64 {
    2_000
}

fn default_refresh_interval_ms() -> u64 {
    1_000
}

fn default_spawn_delay_ms() -> u64 {
    500
}

fn default_speed() -> f64 {
    4.3
}

/// Default craftfleet directory (`~/.craftfleet`).
pub fn fleet_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".craftfleet")
}

/// Default daemon config file path.
pub fn fleet_config_path() -> PathBuf {
    fleet_dir().join(CONFIG_FILENAME)
}

/// Default persisted server config path.
pub fn server_config_path() -> PathBuf {
    fleet_dir().join(SERVER_CONFIG_FILENAME)
}

impl FleetConfig {
    /// Parse a daemon configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, FleetError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| FleetError::ConfigInvalid(format!("invalid daemon config: {e}")))?;
        config.server.validate()?;

        let mut seen = std::collections::HashSet::new();
        for seed in &config.agents {
            if !seen.insert(seed.id) {
                return Err(FleetError::ConfigInvalid(format!(
                    "agent id {} listed twice",
                    seed.id
                )));
            }
        }
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, FleetError> {
        toml::to_string_pretty(self)
            .map_err(|e| FleetError::Persistence(format!("failed to serialize config: {e}")))
    }
}
