//! Craftfleet daemon: supervises a fleet of game-server agent sessions.
//!
//! # Architecture
//!
//! - [`runtime::FleetRuntime`]: single task owning the registry, counters,
//!   history and server config
//! - [`handle::FleetHandle`]: cloneable request/reply façade over the runtime
//! - [`fleet::Fleet`] / [`slot::AgentSlot`]: the agent registry
//! - [`lifecycle`]: session events to state transitions
//! - [`dispatch`]: command execution against a session
//! - [`reconnect`]: kick recovery policy
//! - [`config_manager`]: active server config with atomic persistence
//! - [`control`]: Unix socket server for the CLI
//! - [`api`]: HTTP API over the same command set
//! - [`session`] / [`sim`]: the session boundary and its simulated backend

pub mod api;
pub mod config_manager;
pub mod control;
pub mod dispatch;
pub mod fleet;
pub mod handle;
pub mod history;
pub mod lifecycle;
pub mod reconnect;
pub mod runtime;
pub mod session;
pub mod sim;
pub mod slot;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use craftfleet_control::daemon::{DaemonCommand, DaemonPing, DaemonResponse};
use craftfleet_types::{FleetConfig, FleetError};

use crate::config_manager::ConfigManager;
use crate::handle::FleetHandle;
use crate::runtime::FleetRuntime;
use crate::session::SessionConnector;

/// Run one control command against the fleet.
pub async fn handle_command(handle: &FleetHandle, command: DaemonCommand) -> DaemonResponse {
    match command {
        DaemonCommand::Ping => match handle.stats().await {
            Ok(stats) => respond(
                "pong",
                &DaemonPing {
                    uptime_secs: stats.uptime_secs,
                    agent_count: stats.fleet_size,
                    connected_count: stats.active,
                    daemon_pid: std::process::id(),
                },
            ),
            Err(e) => failure(&e),
        },
        DaemonCommand::ListAgents => match handle.list_agents().await {
            Ok(agents) => respond(format!("{} agent(s)", agents.len()), &agents),
            Err(e) => failure(&e),
        },
        DaemonCommand::AgentStatus { id } => match handle.agent(id).await {
            Ok(Some(record)) => respond(format!("agent {id} is {}", record.state), &record),
            Ok(None) => failure(&FleetError::NotFound(id)),
            Err(e) => failure(&e),
        },
        DaemonCommand::CreateAgent { id, name } => match handle.create_agent(id, name).await {
            Ok(record) => respond(format!("agent {id} created as {}", record.name), &record),
            Err(e) => failure(&e),
        },
        DaemonCommand::CreateAgents { count } => match handle.create_agents(count).await {
            Ok(records) => respond(format!("{} agent(s) created", records.len()), &records),
            Err(e) => failure(&e),
        },
        DaemonCommand::RemoveAgent { id } => match handle.remove_agent(id).await {
            Ok(record) => respond(format!("agent {id} removed"), &record),
            Err(e) => failure(&e),
        },
        DaemonCommand::StopAll => match handle.stop_all().await {
            Ok(stopped) => respond(
                format!("{stopped} agent(s) stopped"),
                &serde_json::json!({ "stopped": stopped }),
            ),
            Err(e) => failure(&e),
        },
        DaemonCommand::Execute {
            id,
            command,
            params,
        } => handle.execute(id, &command, params).await.into(),
        DaemonCommand::Broadcast { command, params } => {
            match handle.broadcast(&command, params).await {
                Ok(results) => {
                    let succeeded = results.iter().filter(|r| r.result.success).count();
                    respond(
                        format!("{command}: {succeeded}/{} agent(s) succeeded", results.len()),
                        &results,
                    )
                }
                Err(e) => failure(&e),
            }
        }
        DaemonCommand::GetConfig => match handle.config().await {
            Ok(config) => respond(format!("target server {}", config.address()), &config),
            Err(e) => failure(&e),
        },
        DaemonCommand::UpdateConfig { config } => match handle.update_config(config).await {
            Ok(config) => respond(
                format!("target server changed to {}", config.address()),
                &config,
            ),
            Err(e) => failure(&e),
        },
        DaemonCommand::History { limit } => match handle.history(limit).await {
            Ok(entries) => respond(format!("{} history entries", entries.len()), &entries),
            Err(e) => failure(&e),
        },
        DaemonCommand::Stats => match handle.stats().await {
            Ok(stats) => respond("fleet stats", &stats),
            Err(e) => failure(&e),
        },
        DaemonCommand::Shutdown => match handle.shutdown().await {
            Ok(()) => DaemonResponse::ok("daemon stopped"),
            Err(e) => failure(&e),
        },
    }
}

fn respond<T: Serialize>(message: impl Into<String>, data: &T) -> DaemonResponse {
    match serde_json::to_value(data) {
        Ok(value) => DaemonResponse::ok_with_data(message, value),
        Err(e) => DaemonResponse::error(format!("failed to serialize response: {e}")),
    }
}

fn failure(e: &FleetError) -> DaemonResponse {
    DaemonResponse::error_with_code(e.to_string(), e.code())
}

/// Run the daemon until ctrl-c or a `shutdown` command.
///
/// The persisted server config at `server_config_path` wins over
/// `config.server` when present and valid.
pub async fn run_daemon(
    config: FleetConfig,
    server_config_path: PathBuf,
    connector: Arc<dyn SessionConnector>,
) -> Result<(), String> {
    let manager = ConfigManager::load_or(server_config_path, config.server.clone());
    let (handle, runtime_task) = FleetRuntime::spawn(manager, config.timings.clone(), connector);

    let control_task =
        control::spawn_control_server(config.control.socket_path.clone(), handle.clone())?;
    let api_task = config
        .api
        .enabled
        .then(|| tokio::spawn(api::serve(config.api.listen.clone(), handle.clone())));

    for seed in &config.agents {
        if let Err(e) = handle.create_agent(seed.id, seed.name.clone()).await {
            warn!(agent = seed.id, error = %e, "failed to create configured agent");
        }
    }
    info!(
        agents = config.agents.len(),
        socket = %config.control.socket_path.display(),
        api = config.api.enabled,
        "daemon started"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("interrupt received, shutting down");
                if let Err(e) = handle.shutdown().await {
                    warn!(error = %e, "fleet runtime already stopped");
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for ctrl-c");
                handle.stopped().await;
            }
        },
        _ = handle.stopped() => {}
    }

    if let Err(e) = runtime_task.await {
        warn!(error = %e, "fleet runtime task failed");
    }
    if let Err(e) = control_task.await {
        warn!(error = %e, "control server task failed");
    }
    if let Some(api_task) = api_task {
        match api_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "http api stopped with an error"),
            Err(e) => warn!(error = %e, "http api task failed"),
        }
    }

    info!("daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftfleet_types::{ServerConfig, SimulationConfig, TimingsConfig};
    use serde_json::json;

    use crate::sim::SimConnector;

    fn test_handle() -> FleetHandle {
        let (handle, _task) = FleetRuntime::spawn(
            ConfigManager::new(ServerConfig::default(), None),
            TimingsConfig::default(),
            Arc::new(SimConnector::new(SimulationConfig::default())),
        );
        handle
    }

    #[tokio::test(start_paused = true)]
    async fn ping_reports_fleet_size() {
        let handle = test_handle();
        handle.create_agent(1, None).await.unwrap();

        let resp = handle_command(&handle, DaemonCommand::Ping).await;
        assert!(resp.ok);
        let ping: DaemonPing = serde_json::from_value(resp.data.unwrap()).unwrap();
        assert_eq!(ping.agent_count, 1);
        assert_eq!(ping.daemon_pid, std::process::id());
    }

    #[tokio::test(start_paused = true)]
    async fn status_of_unknown_agent_is_not_found() {
        let handle = test_handle();
        let resp = handle_command(&handle, DaemonCommand::AgentStatus { id: 7 }).await;
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("not_found"));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_on_unknown_agent_is_unavailable() {
        let handle = test_handle();
        let resp = handle_command(
            &handle,
            DaemonCommand::Execute {
                id: 2,
                command: "jump".into(),
                params: serde_json::Value::Null,
            },
        )
        .await;
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("agent_unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_agents_and_stop_all() {
        let handle = test_handle();
        let resp = handle_command(&handle, DaemonCommand::CreateAgents { count: 3 }).await;
        assert!(resp.ok, "{}", resp.message);
        assert_eq!(resp.data.unwrap().as_array().unwrap().len(), 3);

        let resp = handle_command(&handle, DaemonCommand::StopAll).await;
        assert_eq!(resp.data.unwrap(), json!({ "stopped": 3 }));

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.fleet_size, 0);
        assert_eq!(stats.total_created, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_the_runtime() {
        let handle = test_handle();
        let resp = handle_command(&handle, DaemonCommand::Shutdown).await;
        assert!(resp.ok);
        handle.stopped().await;
        assert!(handle.is_stopped());

        let resp = handle_command(&handle, DaemonCommand::Stats).await;
        assert_eq!(resp.error.as_deref(), Some("runtime_closed"));
    }
}
