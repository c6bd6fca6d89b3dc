//! Daemon-level control protocol types.
//!
//! These commands operate on the whole fleet: creating and removing agents,
//! executing agent commands singly or in bulk, and reading the config,
//! history and stats. One command per line in, one response per line out.

use serde::{Deserialize, Serialize};

use craftfleet_types::{AgentId, CommandResult};

/// A command sent to the daemon control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonCommand {
    /// Health check. Returns uptime, agent count, and connected count.
    Ping,
    /// List every registered agent record.
    ListAgents,
    /// Get the record of a single agent.
    AgentStatus { id: AgentId },
    /// Register a new agent and start connecting it.
    CreateAgent {
        id: AgentId,
        /// Defaults to `<agent_name_prefix><id>`.
        #[serde(default)]
        name: Option<String>,
    },
    /// Register `count` agents with the next free ids.
    CreateAgents { count: usize },
    /// Disconnect and unregister an agent.
    RemoveAgent { id: AgentId },
    /// Disconnect and unregister every agent.
    StopAll,
    /// Execute one command against one agent.
    Execute {
        id: AgentId,
        command: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Execute one command against every registered agent.
    Broadcast {
        command: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Read the active server config.
    GetConfig,
    /// Replace the server config and migrate connected agents.
    ///
    /// Carried as raw JSON so that missing fields surface as a config
    /// validation failure rather than a protocol parse failure.
    UpdateConfig { config: serde_json::Value },
    /// Most recent history entries, newest first.
    History {
        #[serde(default)]
        limit: Option<usize>,
    },
    /// Aggregate fleet statistics.
    Stats,
    /// Request graceful daemon shutdown (disconnects all agents first).
    Shutdown,
}

/// Response to a daemon command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable error code when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl DaemonResponse {
    /// Create a success response.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            error: None,
            data: None,
        }
    }

    /// Create a success response with data.
    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            ok: true,
            message: message.into(),
            error: None,
            data: Some(data),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            error: None,
            data: None,
        }
    }

    /// Create an error response carrying a machine-readable code.
    pub fn error_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: Some(code.into()),
            ..Self::error(message)
        }
    }
}

impl From<CommandResult> for DaemonResponse {
    fn from(result: CommandResult) -> Self {
        Self {
            ok: result.success,
            message: result.message,
            error: result.error,
            data: result.data,
        }
    }
}

/// Per-agent outcome of a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommandResult {
    pub id: AgentId,
    pub result: CommandResult,
}

/// Daemon health/ping response data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonPing {
    /// Daemon uptime in seconds.
    pub uptime_secs: u64,
    /// Registered agents.
    pub agent_count: usize,
    /// Agents currently connected.
    pub connected_count: usize,
    /// Daemon process ID.
    pub daemon_pid: u32,
}

/// Client for connecting to the daemon control socket.
///
/// Uses newline-delimited JSON over a Unix domain socket.
pub struct DaemonClient {
    socket_path: std::path::PathBuf,
}

impl DaemonClient {
    /// Create a new client targeting the given socket path.
    pub fn new(socket_path: std::path::PathBuf) -> Self {
        Self { socket_path }
    }

    /// Create a client for the default socket path (`~/.craftfleet/craftfleet.sock`).
    pub fn default_path() -> Self {
        Self::new(craftfleet_types::ControlConfig::default().socket_path)
    }

    /// Send a command and receive the response (blocking).
    pub fn send(&self, command: &DaemonCommand) -> Result<DaemonResponse, String> {
        use std::io::{BufRead, BufReader, Read, Write};
        use std::os::unix::net::UnixStream;

        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            format!(
                "failed to connect to daemon at {}: {e}",
                self.socket_path.display()
            )
        })?;

        let mut writer = stream
            .try_clone()
            .map_err(|e| format!("failed to clone stream: {e}"))?;

        let mut json = serde_json::to_string(command)
            .map_err(|e| format!("failed to serialize command: {e}"))?;
        json.push('\n');
        writer
            .write_all(json.as_bytes())
            .map_err(|e| format!("failed to send command: {e}"))?;
        writer.flush().map_err(|e| format!("failed to flush: {e}"))?;

        let reader = BufReader::new(stream);
        let mut line = String::new();
        reader
            .take(4_000_000)
            .read_line(&mut line)
            .map_err(|e| format!("failed to read response: {e}"))?;

        serde_json::from_str(&line).map_err(|e| format!("failed to parse response: {e}"))
    }

    /// Check if the daemon is running by attempting a Ping.
    pub fn is_running(&self) -> bool {
        self.send(&DaemonCommand::Ping).is_ok()
    }
}
