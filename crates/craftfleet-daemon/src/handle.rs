//! Cloneable façade over the fleet runtime.

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use craftfleet_control::daemon::AgentCommandResult;
use craftfleet_types::{
    AgentId, AgentRecord, CommandResult, FleetError, FleetStats, HistoryEntry, ServerConfig,
    HISTORY_CAPACITY,
};

use crate::runtime::FleetRequest;

/// Sends requests to the runtime task and awaits its replies.
///
/// Every method fails with [`FleetError::RuntimeClosed`] once the runtime has
/// stopped.
#[derive(Clone)]
pub struct FleetHandle {
    requests: mpsc::Sender<FleetRequest>,
    stopped: watch::Receiver<bool>,
}

impl FleetHandle {
    pub(crate) fn new(requests: mpsc::Sender<FleetRequest>, stopped: watch::Receiver<bool>) -> Self {
        Self { requests, stopped }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> FleetRequest,
    ) -> Result<T, FleetError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| FleetError::RuntimeClosed)?;
        rx.await.map_err(|_| FleetError::RuntimeClosed)
    }

    /// Register an agent and start connecting it. A blank name falls back to
    /// the configured prefix plus the id.
    pub async fn create_agent(
        &self,
        id: AgentId,
        name: Option<String>,
    ) -> Result<AgentRecord, FleetError> {
        self.call(|reply| FleetRequest::Create { id, name, reply })
            .await?
    }

    /// Register `count` agents with fresh ids.
    pub async fn create_agents(&self, count: usize) -> Result<Vec<AgentRecord>, FleetError> {
        self.call(|reply| FleetRequest::CreateMany { count, reply })
            .await?
    }

    pub async fn remove_agent(&self, id: AgentId) -> Result<AgentRecord, FleetError> {
        self.call(|reply| FleetRequest::Remove { id, reply }).await?
    }

    /// Remove every agent. Returns how many were removed.
    pub async fn stop_all(&self) -> Result<usize, FleetError> {
        self.call(|reply| FleetRequest::StopAll { reply }).await
    }

    pub async fn agent(&self, id: AgentId) -> Result<Option<AgentRecord>, FleetError> {
        self.call(|reply| FleetRequest::Lookup { id, reply }).await
    }

    /// Every record, ordered by id.
    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>, FleetError> {
        self.call(|reply| FleetRequest::List { reply }).await
    }

    /// Run one command against one agent and wait for it to settle.
    pub async fn execute(&self, id: AgentId, kind: &str, params: Value) -> CommandResult {
        let kind = kind.to_string();
        match self
            .call(|reply| FleetRequest::Execute {
                id,
                kind,
                params,
                reply,
            })
            .await
        {
            Ok(result) => result,
            Err(e) => CommandResult::failed(&e),
        }
    }

    /// Run the same command against every registered agent concurrently.
    pub async fn broadcast(
        &self,
        kind: &str,
        params: Value,
    ) -> Result<Vec<AgentCommandResult>, FleetError> {
        let ids: Vec<AgentId> = self.list_agents().await?.iter().map(|r| r.id).collect();
        let runs = ids.into_iter().map(|id| {
            let params = params.clone();
            async move {
                AgentCommandResult {
                    id,
                    result: self.execute(id, kind, params).await,
                }
            }
        });
        Ok(join_all(runs).await)
    }

    pub async fn config(&self) -> Result<ServerConfig, FleetError> {
        self.call(|reply| FleetRequest::Config { reply }).await
    }

    /// Replace the server config and migrate connected agents onto it.
    pub async fn update_config(&self, config: Value) -> Result<ServerConfig, FleetError> {
        self.call(|reply| FleetRequest::UpdateConfig { config, reply })
            .await?
    }

    /// Newest-first history, `limit` defaulting to the buffer capacity.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>, FleetError> {
        let limit = limit.unwrap_or(HISTORY_CAPACITY);
        self.call(|reply| FleetRequest::History { limit, reply })
            .await
    }

    pub async fn stats(&self) -> Result<FleetStats, FleetError> {
        self.call(|reply| FleetRequest::Stats { reply }).await
    }

    /// Disconnect every agent and stop the runtime.
    pub async fn shutdown(&self) -> Result<(), FleetError> {
        self.call(|reply| FleetRequest::Shutdown { reply }).await
    }

    /// Resolves once the runtime has stopped.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }
}
