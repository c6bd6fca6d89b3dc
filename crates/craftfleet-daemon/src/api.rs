//! HTTP API for the fleet.
//!
//! Every route maps onto a `DaemonCommand` and answers with the same
//! `DaemonResponse` body the control socket returns, with the HTTP status
//! derived from the error code.

use std::net::SocketAddr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use craftfleet_control::daemon::{DaemonCommand, DaemonResponse};
use craftfleet_types::AgentId;

use crate::handle::FleetHandle;

#[derive(Clone)]
struct ApiState {
    handle: FleetHandle,
}

type ApiResponse = (StatusCode, Json<DaemonResponse>);

pub fn router(handle: FleetHandle) -> Router {
    Router::new()
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/{id}", get(agent_status).delete(remove_agent))
        .route("/api/agents/{id}/command", post(execute))
        .route("/api/command", post(broadcast))
        .route("/api/stop-all", post(stop_all))
        .route("/api/stats", get(stats))
        .route("/api/history", get(history))
        .route("/api/config", get(get_config).put(update_config))
        .with_state(ApiState { handle })
}

/// Serve the API on `listen` until the runtime stops.
pub async fn serve(listen: String, handle: FleetHandle) -> Result<(), String> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid api listen addr {listen:?}: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("api bind failed: {e}"))?;
    info!(listen = %addr, "http api listening");

    let shutdown = handle.clone();
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { shutdown.stopped().await })
        .await
        .map_err(|e| format!("api server failed: {e}"))?;
    Ok(())
}

/// HTTP status for a response, keyed on its error code.
pub fn status_for(response: &DaemonResponse) -> StatusCode {
    if response.ok {
        return StatusCode::OK;
    }
    match response.error.as_deref() {
        Some("not_found") => StatusCode::NOT_FOUND,
        Some("agent_unavailable" | "duplicate_id" | "capacity_exceeded") => StatusCode::CONFLICT,
        Some("unknown_command" | "invalid_params" | "config_invalid") => StatusCode::BAD_REQUEST,
        Some("target_not_found") => StatusCode::UNPROCESSABLE_ENTITY,
        Some("session_error") => StatusCode::BAD_GATEWAY,
        Some("runtime_closed") => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn run(state: &ApiState, command: DaemonCommand) -> ApiResponse {
    let response = crate::handle_command(&state.handle, command).await;
    (status_for(&response), Json(response))
}

#[derive(Deserialize)]
struct CreateAgentBody {
    id: AgentId,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct CommandBody {
    command: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn list_agents(State(state): State<ApiState>) -> ApiResponse {
    run(&state, DaemonCommand::ListAgents).await
}

async fn create_agent(
    State(state): State<ApiState>,
    Json(body): Json<CreateAgentBody>,
) -> ApiResponse {
    run(
        &state,
        DaemonCommand::CreateAgent {
            id: body.id,
            name: body.name,
        },
    )
    .await
}

async fn agent_status(State(state): State<ApiState>, Path(id): Path<AgentId>) -> ApiResponse {
    run(&state, DaemonCommand::AgentStatus { id }).await
}

async fn remove_agent(State(state): State<ApiState>, Path(id): Path<AgentId>) -> ApiResponse {
    run(&state, DaemonCommand::RemoveAgent { id }).await
}

async fn execute(
    State(state): State<ApiState>,
    Path(id): Path<AgentId>,
    Json(body): Json<CommandBody>,
) -> ApiResponse {
    run(
        &state,
        DaemonCommand::Execute {
            id,
            command: body.command,
            params: body.params,
        },
    )
    .await
}

async fn broadcast(State(state): State<ApiState>, Json(body): Json<CommandBody>) -> ApiResponse {
    run(
        &state,
        DaemonCommand::Broadcast {
            command: body.command,
            params: body.params,
        },
    )
    .await
}

async fn stop_all(State(state): State<ApiState>) -> ApiResponse {
    run(&state, DaemonCommand::StopAll).await
}

async fn stats(State(state): State<ApiState>) -> ApiResponse {
    run(&state, DaemonCommand::Stats).await
}

async fn history(State(state): State<ApiState>, Query(query): Query<HistoryQuery>) -> ApiResponse {
    run(&state, DaemonCommand::History { limit: query.limit }).await
}

async fn get_config(State(state): State<ApiState>) -> ApiResponse {
    run(&state, DaemonCommand::GetConfig).await
}

async fn update_config(State(state): State<ApiState>, Json(config): Json<Value>) -> ApiResponse {
    run(&state, DaemonCommand::UpdateConfig { config }).await
}
