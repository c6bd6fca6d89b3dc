//! `craftfleet server`: show or change the target server.

use craftfleet_control::daemon::{DaemonClient, DaemonCommand};
use craftfleet_types::ServerConfig;

use super::request;

/// Fields to override on the active server config.
#[derive(Debug, Default)]
pub struct ServerChanges {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol_version: Option<String>,
    pub agent_name_prefix: Option<String>,
    pub max_agents: Option<usize>,
    pub auto_reconnect: Option<bool>,
}

impl ServerChanges {
    fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.protocol_version.is_none()
            && self.agent_name_prefix.is_none()
            && self.max_agents.is_none()
            && self.auto_reconnect.is_none()
    }

    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(version) = self.protocol_version {
            config.protocol_version = version;
        }
        if let Some(prefix) = self.agent_name_prefix {
            config.agent_name_prefix = prefix;
        }
        if let Some(max) = self.max_agents {
            config.max_agents = max;
        }
        if let Some(auto) = self.auto_reconnect {
            config.auto_reconnect = auto;
        }
        config
    }
}

fn fetch(client: &DaemonClient) -> anyhow::Result<ServerConfig> {
    let response = request(client, &DaemonCommand::GetConfig)?;
    Ok(serde_json::from_value(response.data.unwrap_or_default())?)
}

fn print_config(config: &ServerConfig) {
    println!("Target server: {}", config.address());
    println!("  Version:         {}", config.protocol_version);
    println!("  Name prefix:     {}", config.agent_name_prefix);
    println!("  Max agents:      {}", config.max_agents);
    println!("  Auto-reconnect:  {}", config.auto_reconnect);
}

pub fn show(client: &DaemonClient) -> anyhow::Result<()> {
    print_config(&fetch(client)?);
    Ok(())
}

/// Apply `changes` on top of the active config and send the result.
pub fn set(client: &DaemonClient, changes: ServerChanges) -> anyhow::Result<()> {
    if changes.is_empty() {
        anyhow::bail!("nothing to change; pass at least one of --host, --port, --version, ...");
    }

    let next = changes.apply(fetch(client)?);
    let response = request(
        client,
        &DaemonCommand::UpdateConfig {
            config: serde_json::to_value(&next)?,
        },
    )?;

    println!("{}", response.message);
    if let Some(data) = response.data {
        let config: ServerConfig = serde_json::from_value(data)?;
        print_config(&config);
    }
    Ok(())
}
