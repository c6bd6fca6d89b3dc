//! CLI commands for the craftfleet daemon.
//!
//! Implements the `craftfleet daemon` subcommand tree:
//! - `init`: create a default craftfleet.toml
//! - `run`: run the daemon in the foreground
//! - `stop`: shut a running daemon down
//! - `status`: query daemon health

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use craftfleet_control::daemon::{DaemonClient, DaemonCommand, DaemonPing};
use craftfleet_daemon::sim::SimConnector;
use craftfleet_types::config::{fleet_config_path, fleet_dir, server_config_path};
use craftfleet_types::{AgentSeed, FleetConfig};

/// Write an example config to `~/.craftfleet/craftfleet.toml`.
pub fn init() -> anyhow::Result<()> {
    let config_path = fleet_config_path();
    if config_path.exists() {
        anyhow::bail!(
            "config already exists at {}\nEdit it directly or remove to reinitialize.",
            config_path.display()
        );
    }

    std::fs::create_dir_all(fleet_dir())?;

    let example = FleetConfig {
        agents: vec![
            AgentSeed { id: 1, name: None },
            AgentSeed {
                id: 2,
                name: Some("Scout".into()),
            },
        ],
        ..FleetConfig::default()
    };
    std::fs::write(&config_path, example.to_toml()?)?;

    println!("Config created at: {}", config_path.display());
    println!();
    println!("Set the target server under [server], then start with:");
    println!("  craftfleet daemon run");

    Ok(())
}

/// Run the daemon in the foreground. Blocks until shutdown.
pub fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config_path = config_path.unwrap_or_else(fleet_config_path);
    let config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        FleetConfig::from_toml(&content)?
    } else {
        info!(path = %config_path.display(), "no config file, using defaults");
        FleetConfig::default()
    };

    let client = DaemonClient::new(config.control.socket_path.clone());
    if client.is_running() {
        anyhow::bail!(
            "Daemon already running at {}.\nUse `craftfleet daemon stop` to stop it first.",
            config.control.socket_path.display()
        );
    }

    println!(
        "Daemon starting against {} with {} agent(s)...",
        config.server.address(),
        config.agents.len()
    );

    let connector = Arc::new(SimConnector::new(config.simulation.clone()));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime
        .block_on(craftfleet_daemon::run_daemon(
            config,
            server_config_path(),
            connector,
        ))
        .map_err(|e| anyhow::anyhow!("{e}"))
}

/// Stop a running daemon via the control socket.
pub fn stop(client: &DaemonClient) -> anyhow::Result<()> {
    if !client.is_running() {
        println!("Daemon is not running.");
        return Ok(());
    }

    let response = client
        .send(&DaemonCommand::Shutdown)
        .map_err(|e| anyhow::anyhow!("failed to send shutdown: {e}"))?;

    if response.ok {
        println!("Daemon stopped.");
    } else {
        println!("Shutdown failed: {}", response.message);
    }

    Ok(())
}

/// Query daemon status.
pub fn status(client: &DaemonClient) -> anyhow::Result<()> {
    if !client.is_running() {
        println!("Daemon is not running.");
        return Ok(());
    }

    let response = client
        .send(&DaemonCommand::Ping)
        .map_err(|e| anyhow::anyhow!("failed to ping daemon: {e}"))?;

    if !response.ok {
        println!("Daemon error: {}", response.message);
        return Ok(());
    }

    if let Some(data) = response.data {
        if let Ok(ping) = serde_json::from_value::<DaemonPing>(data) {
            println!("Daemon status: running");
            println!("  PID:     {}", ping.daemon_pid);
            println!("  Uptime:  {}s", ping.uptime_secs);
            println!(
                "  Agents:  {} total, {} connected",
                ping.agent_count, ping.connected_count
            );
        }
    }

    Ok(())
}
