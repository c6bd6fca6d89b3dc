//! Fleet runtime: the one task that owns all fleet state.
//!
//! The registry, counters, history and server config live here and are only
//! touched by [`FleetRuntime::run`], one message at a time. Session I/O runs
//! in spawned tasks that report back through the event channel, tagged with
//! the agent id and the session generation they were started under. A
//! message whose generation no longer matches its slot is stale and is
//! dropped (or answered with `AgentUnavailable`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use craftfleet_types::{
    AgentId, AgentRecord, AgentState, Command, CommandResult, FleetError, FleetStats,
    HistoryEntry, HistoryKind, ServerConfig, SessionError, TimingsConfig,
};

use crate::config_manager::ConfigManager;
use crate::dispatch::{self, ActivityChange, Completion};
use crate::fleet::{Admission, Fleet};
use crate::handle::FleetHandle;
use crate::history::History;
use crate::lifecycle::{self, Effect};
use crate::reconnect::ReconnectPolicy;
use crate::session::{AgentSession, SessionConnector, SessionEvent, SessionHandle, Vitals};
use crate::slot::AgentSlot;
use crate::stats::StatsCounters;

/// Pending caller requests before `send` starts waiting.
const REQUEST_QUEUE: usize = 256;

/// How long shutdown waits for sessions to disconnect.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) type Reply<T> = oneshot::Sender<Result<T, FleetError>>;

/// A caller request, answered through its oneshot.
pub(crate) enum FleetRequest {
    Create {
        id: AgentId,
        name: Option<String>,
        reply: Reply<AgentRecord>,
    },
    CreateMany {
        count: usize,
        reply: Reply<Vec<AgentRecord>>,
    },
    Remove {
        id: AgentId,
        reply: Reply<AgentRecord>,
    },
    StopAll {
        reply: oneshot::Sender<usize>,
    },
    Lookup {
        id: AgentId,
        reply: oneshot::Sender<Option<AgentRecord>>,
    },
    List {
        reply: oneshot::Sender<Vec<AgentRecord>>,
    },
    Execute {
        id: AgentId,
        kind: String,
        params: serde_json::Value,
        reply: oneshot::Sender<CommandResult>,
    },
    Config {
        reply: oneshot::Sender<ServerConfig>,
    },
    UpdateConfig {
        config: serde_json::Value,
        reply: Reply<ServerConfig>,
    },
    History {
        limit: usize,
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    Stats {
        reply: oneshot::Sender<FleetStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Why an agent is being brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Respawn {
    Reconnect,
    Migration,
}

#[derive(Debug)]
enum TimerAction {
    Welcome { id: AgentId, generation: u64 },
    Respawn { id: AgentId, token: u64, reason: Respawn },
    ResetActivity { id: AgentId, generation: u64, token: u64 },
}

struct Settlement {
    id: AgentId,
    generation: u64,
    command: Command,
    opening: Option<u64>,
    outcome: Result<Completion, FleetError>,
    reply: oneshot::Sender<CommandResult>,
}

enum RuntimeEvent {
    Connected {
        id: AgentId,
        generation: u64,
        result: Result<SessionHandle, SessionError>,
    },
    Session {
        id: AgentId,
        generation: u64,
        event: SessionEvent,
    },
    Settled(Settlement),
    Timer(TimerAction),
}

/// Owner of all fleet state. Drive it with [`run`](Self::run) and talk to it
/// through the [`FleetHandle`] returned by [`new`](Self::new).
pub struct FleetRuntime {
    fleet: Fleet,
    stats: StatsCounters,
    history: History,
    config: ConfigManager,
    timings: TimingsConfig,
    reconnect: ReconnectPolicy,
    connector: Arc<dyn SessionConnector>,
    requests: mpsc::Receiver<FleetRequest>,
    events_tx: mpsc::UnboundedSender<RuntimeEvent>,
    events_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    next_generation: u64,
    stopped: watch::Sender<bool>,
}

impl FleetRuntime {
    pub fn new(
        config: ConfigManager,
        timings: TimingsConfig,
        connector: Arc<dyn SessionConnector>,
    ) -> (Self, FleetHandle) {
        let (requests_tx, requests) = mpsc::channel(REQUEST_QUEUE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stopped, stopped_rx) = watch::channel(false);

        let runtime = Self {
            fleet: Fleet::new(),
            stats: StatsCounters::default(),
            history: History::default(),
            config,
            reconnect: ReconnectPolicy::new(timings.reconnect_delay()),
            timings,
            connector,
            requests,
            events_tx,
            events_rx,
            next_generation: 0,
            stopped,
        };
        (runtime, FleetHandle::new(requests_tx, stopped_rx))
    }

    /// Create a runtime and run it on a new task.
    pub fn spawn(
        config: ConfigManager,
        timings: TimingsConfig,
        connector: Arc<dyn SessionConnector>,
    ) -> (FleetHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(config, timings, connector);
        (handle, tokio::spawn(runtime.run()))
    }

    /// Process requests and events until shutdown is requested or every
    /// handle is dropped.
    pub async fn run(mut self) {
        info!(server = %self.config.snapshot().address(), "fleet runtime started");

        let mut refresh = tokio::time::interval(self.timings.refresh_interval());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => {
                        if let Some(reply) = self.handle_request(request) {
                            self.shutdown().await;
                            let _ = reply.send(());
                            break;
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = refresh.tick() => self.refresh_vitals(),
            }
        }

        self.stopped.send_replace(true);
        info!("fleet runtime stopped");
    }

    /// Handle one request. Returns the reply channel of a shutdown request.
    fn handle_request(&mut self, request: FleetRequest) -> Option<oneshot::Sender<()>> {
        match request {
            FleetRequest::Create { id, name, reply } => {
                let _ = reply.send(self.register(id, name));
            }
            FleetRequest::CreateMany { count, reply } => {
                let _ = reply.send(self.register_many(count));
            }
            FleetRequest::Remove { id, reply } => {
                let _ = reply.send(self.unregister(id));
            }
            FleetRequest::StopAll { reply } => {
                let _ = reply.send(self.stop_all());
            }
            FleetRequest::Lookup { id, reply } => {
                let _ = reply.send(self.fleet.slot(id).map(|s| s.record.clone()));
            }
            FleetRequest::List { reply } => {
                let _ = reply.send(self.fleet.records());
            }
            FleetRequest::Execute {
                id,
                kind,
                params,
                reply,
            } => self.execute(id, &kind, params, reply),
            FleetRequest::Config { reply } => {
                let _ = reply.send(ServerConfig::clone(&self.config.snapshot()));
            }
            FleetRequest::UpdateConfig { config, reply } => {
                let _ = reply.send(self.update_config(config));
            }
            FleetRequest::History { limit, reply } => {
                let _ = reply.send(self.history.recent(limit));
            }
            FleetRequest::Stats { reply } => {
                let _ = reply.send(self.stats.snapshot(&self.fleet));
            }
            FleetRequest::Shutdown { reply } => return Some(reply),
        }
        None
    }

    fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Connected {
                id,
                generation,
                result,
            } => self.on_connected(id, generation, result),
            RuntimeEvent::Session {
                id,
                generation,
                event,
            } => self.on_session_event(id, generation, event),
            RuntimeEvent::Settled(settlement) => self.on_settled(settlement),
            RuntimeEvent::Timer(action) => self.on_timer(action),
        }
    }

    // -- registry ---------------------------------------------------------

    fn register(&mut self, id: AgentId, name: Option<String>) -> Result<AgentRecord, FleetError> {
        let server = self.config.snapshot();
        if self.fleet.admit(id, server.max_agents)? == Admission::Supersede {
            if let Ok(mut old) = self.fleet.remove(id) {
                info!(agent = id, state = %old.record.state, "superseding agent record");
                disconnect_detached(id, old.detach(), "superseded");
            }
        }

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| server.agent_name(id));
        let generation = self.bump_generation();
        let record = AgentRecord::new(id, name.clone(), &server);
        self.fleet.insert(AgentSlot::new(record.clone(), generation));
        self.stats.total_created += 1;
        self.record_history(
            HistoryKind::System,
            format!("created {name} (agent {id}) for {}", server.address()),
        );
        info!(agent = id, name = %name, server = %server.address(), "agent created");

        self.open_session(id, generation, name, server);
        Ok(record)
    }

    /// Create `count` agents with fresh ids, stopping at the first failure.
    fn register_many(&mut self, count: usize) -> Result<Vec<AgentRecord>, FleetError> {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let result = match self.fleet.next_free_id() {
                Some(id) => self.register(id, None),
                None => Err(FleetError::InvalidParams("no agent ids left".into())),
            };
            match result {
                Ok(record) => created.push(record),
                Err(e) if created.is_empty() => return Err(e),
                Err(e) => {
                    warn!(created = created.len(), requested = count, error = %e, "bulk create stopped early");
                    break;
                }
            }
        }
        Ok(created)
    }

    fn unregister(&mut self, id: AgentId) -> Result<AgentRecord, FleetError> {
        let mut slot = self.fleet.remove(id)?;
        let record = slot.record.clone();
        disconnect_detached(id, slot.detach(), "removed");
        self.record_history(
            HistoryKind::System,
            format!("removed {} (agent {id})", record.name),
        );
        info!(agent = id, "agent removed");
        Ok(record)
    }

    fn stop_all(&mut self) -> usize {
        let mut stopped = 0;
        for id in self.fleet.ids() {
            if self.unregister(id).is_ok() {
                stopped += 1;
            }
        }
        stopped
    }

    fn open_session(
        &self,
        id: AgentId,
        generation: u64,
        name: String,
        server: Arc<ServerConfig>,
    ) {
        let connector = Arc::clone(&self.connector);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&server, &name).await;
            let _ = events.send(RuntimeEvent::Connected {
                id,
                generation,
                result,
            });
        });
    }

    fn on_connected(
        &mut self,
        id: AgentId,
        generation: u64,
        result: Result<SessionHandle, SessionError>,
    ) {
        let Some(slot) = self
            .fleet
            .slot_mut(id)
            .filter(|slot| slot.generation == generation)
        else {
            if let Ok(handle) = result {
                debug!(agent = id, generation, "discarding session opened for a stale generation");
                disconnect_detached(id, Some(handle.session), "superseded");
            }
            return;
        };

        match result {
            Ok(SessionHandle { session, mut events }) => {
                let tx = self.events_tx.clone();
                let pump = tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let tagged = RuntimeEvent::Session {
                            id,
                            generation,
                            event,
                        };
                        if tx.send(tagged).is_err() {
                            break;
                        }
                    }
                });
                slot.attach(session, pump);
                debug!(agent = id, generation, "session attached");
            }
            Err(e) => {
                slot.transition(AgentState::Error);
                let name = slot.record.name.clone();
                warn!(agent = id, error = %e, "agent failed to connect");
                self.stats.errors += 1;
                self.record_history(HistoryKind::Error, format!("{name} failed to connect: {e}"));
            }
        }
    }

    // -- lifecycle --------------------------------------------------------

    fn on_session_event(&mut self, id: AgentId, generation: u64, event: SessionEvent) {
        let Some(slot) = self.fleet.slot_mut(id) else {
            return;
        };
        if slot.generation != generation {
            debug!(agent = id, generation, ?event, "dropping event from superseded session");
            return;
        }
        let Some(transition) = lifecycle::reduce(&slot.record, &event) else {
            debug!(agent = id, state = %slot.record.state, ?event, "ignoring event in current state");
            return;
        };

        if let Some(next) = transition.next {
            slot.transition(next);
            if next == AgentState::Connected {
                slot.record.connected_at = Some(Utc::now());
                if let Some(session) = slot.session() {
                    apply_vitals(&mut slot.record, session.vitals());
                }
            }
            info!(agent = id, state = %next, "agent state changed");
        }

        for effect in transition.effects {
            self.apply_effect(id, generation, effect);
        }
    }

    fn apply_effect(&mut self, id: AgentId, generation: u64, effect: Effect) {
        match effect {
            Effect::ScheduleWelcome => {
                self.schedule(
                    self.timings.welcome_delay(),
                    TimerAction::Welcome { id, generation },
                );
            }
            Effect::ScheduleReconnect => {
                if let Some(delay) = self.reconnect.on_kick(&self.config.snapshot()) {
                    info!(agent = id, delay_ms = delay.as_millis() as u64, "scheduling reconnection");
                    self.schedule_respawn(id, delay, Respawn::Reconnect);
                }
            }
            Effect::CountError => self.stats.errors += 1,
            Effect::DetachSession => {
                let next = self.bump_generation();
                if let Some(slot) = self.fleet.slot_mut(id) {
                    slot.generation = next;
                    drop(slot.detach());
                }
            }
            Effect::History(kind, message) => self.record_history(kind, message),
        }
    }

    fn on_timer(&mut self, action: TimerAction) {
        match action {
            TimerAction::Welcome { id, generation } => {
                let Some(slot) = self.fleet.slot(id).filter(|s| {
                    s.generation == generation && s.record.state == AgentState::Connected
                }) else {
                    return;
                };
                let Some(session) = slot.session() else {
                    return;
                };
                let line = format!("Hello! {} reporting in.", slot.record.name);
                tokio::spawn(async move {
                    if let Err(e) = session.chat(&line).await {
                        warn!(agent = id, error = %e, "welcome message failed");
                    }
                });
            }
            TimerAction::Respawn { id, token, reason } => self.respawn(id, token, reason),
            TimerAction::ResetActivity {
                id,
                generation,
                token,
            } => {
                if let Some(slot) = self.fleet.slot_mut(id) {
                    if slot.generation == generation {
                        slot.reset_activity_if(token);
                    }
                }
            }
        }
    }

    /// Arm a respawn on the slot and fire it after `delay`. Only the most
    /// recently armed timer of that same slot may act.
    fn schedule_respawn(&mut self, id: AgentId, delay: Duration, reason: Respawn) {
        let token = self.bump_generation();
        if let Some(slot) = self.fleet.slot_mut(id) {
            slot.arm_respawn(token);
            self.schedule(delay, TimerAction::Respawn { id, token, reason });
        }
    }

    /// Recreate the session of a registered, non-live agent against the
    /// current server config, keeping its id and name.
    fn respawn(&mut self, id: AgentId, token: u64, reason: Respawn) {
        let armed = self
            .fleet
            .slot_mut(id)
            .is_some_and(|slot| slot.take_respawn(token));
        let state = self.fleet.slot(id).map(|s| s.record.state);
        if !armed || !ReconnectPolicy::should_respawn(state) {
            debug!(agent = id, armed, ?state, ?reason, "skipping respawn");
            return;
        }

        let server = self.config.snapshot();
        let generation = self.bump_generation();
        let Some(slot) = self.fleet.slot_mut(id) else {
            return;
        };
        disconnect_detached(id, slot.detach(), "replaced");
        slot.generation = generation;
        slot.transition(AgentState::Connecting);
        slot.record.server = server.address();
        let name = slot.record.name.clone();

        self.stats.total_created += 1;
        let verb = match reason {
            Respawn::Reconnect => "reconnecting",
            Respawn::Migration => "migrating",
        };
        self.record_history(
            HistoryKind::System,
            format!("{verb} {name} to {}", server.address()),
        );
        info!(agent = id, server = %server.address(), ?reason, "respawning agent");

        self.open_session(id, generation, name, server);
    }

    fn refresh_vitals(&mut self) {
        for slot in self.fleet.slots_mut() {
            if slot.record.state != AgentState::Connected {
                continue;
            }
            if let Some(session) = slot.session() {
                apply_vitals(&mut slot.record, session.vitals());
            }
        }
    }

    // -- commands ---------------------------------------------------------

    fn execute(
        &mut self,
        id: AgentId,
        kind: &str,
        params: serde_json::Value,
        reply: oneshot::Sender<CommandResult>,
    ) {
        let command = match Command::parse(kind, params) {
            Ok(command) => command,
            Err(e) => {
                let _ = reply.send(CommandResult::failed(&e));
                return;
            }
        };

        let Some(slot) = self.fleet.slot_mut(id) else {
            let _ = reply.send(CommandResult::failed(&FleetError::AgentUnavailable(id)));
            return;
        };
        let Some(session) = slot.session().filter(|_| slot.is_commandable()) else {
            let _ = reply.send(CommandResult::failed(&FleetError::AgentUnavailable(id)));
            return;
        };

        let plan = dispatch::plan(command);
        slot.record.last_command = Some(plan.command.to_string());
        let generation = slot.generation;
        let name = slot.record.name.clone();
        let opening = plan
            .opening
            .map(|opening| (slot.set_activity(opening.activity), opening.expires));

        self.stats.commands_executed += 1;
        self.record_history(HistoryKind::Command, format!("{name}: {}", plan.command));
        if let Some((token, Some(expires))) = opening {
            self.schedule(
                expires,
                TimerAction::ResetActivity {
                    id,
                    generation,
                    token,
                },
            );
        }
        debug!(agent = id, command = %plan.command, "dispatching command");

        let events = self.events_tx.clone();
        let command = plan.command;
        tokio::spawn(async move {
            let outcome = dispatch::perform(session.as_ref(), &command).await;
            let _ = events.send(RuntimeEvent::Settled(Settlement {
                id,
                generation,
                command,
                opening: opening.map(|(token, _)| token),
                outcome,
                reply,
            }));
        });
    }

    fn on_settled(&mut self, settlement: Settlement) {
        let Settlement {
            id,
            generation,
            command,
            opening,
            outcome,
            reply,
        } = settlement;

        let Some(slot) = self
            .fleet
            .slot_mut(id)
            .filter(|slot| slot.generation == generation)
        else {
            debug!(agent = id, command = %command, "command settled after its session went away");
            let _ = reply.send(CommandResult::failed(&FleetError::AgentUnavailable(id)));
            return;
        };

        let result = match outcome {
            Ok(completion) => {
                let mut hold = None;
                match completion.activity {
                    ActivityChange::Keep => {}
                    ActivityChange::EndOpening => {
                        if let Some(token) = opening {
                            slot.reset_activity_if(token);
                        }
                    }
                    ActivityChange::Set(activity) => {
                        slot.set_activity(activity);
                    }
                    ActivityChange::Hold(activity, duration) => {
                        hold = Some((slot.set_activity(activity), duration));
                    }
                }
                if let Some(counter) = completion.counter {
                    self.stats.credit(counter);
                }
                if let Some((token, duration)) = hold {
                    self.schedule(
                        duration,
                        TimerAction::ResetActivity {
                            id,
                            generation,
                            token,
                        },
                    );
                }
                match completion.data {
                    Some(data) => CommandResult::ok_with_data(completion.message, data),
                    None => CommandResult::ok(completion.message),
                }
            }
            Err(e) => {
                if let Some(token) = opening {
                    slot.reset_activity_if(token);
                }
                let e = match e {
                    FleetError::Session(SessionError::Closed) => FleetError::AgentUnavailable(id),
                    e => e,
                };
                let name = slot.record.name.clone();
                if e.is_session_fault() {
                    warn!(agent = id, command = %command, error = %e, "command failed");
                    self.stats.errors += 1;
                    self.record_history(HistoryKind::Error, format!("{name}: {command} failed: {e}"));
                } else {
                    debug!(agent = id, command = %command, error = %e, "command did not complete");
                }
                CommandResult::failed(&e)
            }
        };
        let _ = reply.send(result);
    }

    // -- configuration ----------------------------------------------------

    /// Replace the server config and move every connected agent onto it.
    fn update_config(&mut self, value: serde_json::Value) -> Result<ServerConfig, FleetError> {
        let next = ServerConfig::from_json(value)?;
        let previous = self.config.snapshot();
        let server = self.config.replace(next)?;

        let connected: Vec<AgentId> = self
            .fleet
            .records()
            .iter()
            .filter(|r| r.state == AgentState::Connected)
            .map(|r| r.id)
            .collect();

        for &id in &connected {
            let generation = self.bump_generation();
            if let Some(slot) = self.fleet.slot_mut(id) {
                slot.generation = generation;
                disconnect_detached(id, slot.detach(), "server changed");
                slot.transition(AgentState::Disconnected);
            }
            self.schedule_respawn(id, self.timings.migration_delay(), Respawn::Migration);
        }

        info!(
            from = %previous.address(),
            to = %server.address(),
            migrating = connected.len(),
            "server config updated"
        );
        self.record_history(
            HistoryKind::System,
            format!(
                "server changed from {} to {}, migrating {} agent(s)",
                previous.address(),
                server.address(),
                connected.len()
            ),
        );
        Ok(ServerConfig::clone(&server))
    }

    // -- helpers ----------------------------------------------------------

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn record_history(&mut self, kind: HistoryKind, message: String) {
        let fleet_size = self.fleet.len();
        self.history.push(kind, message, fleet_size);
    }

    fn schedule(&self, delay: Duration, action: TimerAction) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(RuntimeEvent::Timer(action));
        });
    }

    async fn shutdown(&mut self) {
        let mut sessions = Vec::new();
        for id in self.fleet.ids() {
            if let Ok(mut slot) = self.fleet.remove(id) {
                sessions.extend(slot.detach());
            }
        }
        info!(sessions = sessions.len(), "disconnecting all agents");

        let disconnects = join_all(
            sessions
                .iter()
                .map(|session| session.disconnect("daemon shutting down")),
        );
        match tokio::time::timeout(SHUTDOWN_GRACE, disconnects).await {
            Ok(results) => {
                for e in results.into_iter().filter_map(Result::err) {
                    warn!(error = %e, "disconnect failed during shutdown");
                }
            }
            Err(_) => warn!("timed out disconnecting agents"),
        }
    }
}

fn apply_vitals(record: &mut AgentRecord, vitals: Vitals) {
    record.position = vitals.position;
    record.health = vitals.health;
    record.food = vitals.food;
}

/// Disconnect a session that is no longer attached to any slot.
fn disconnect_detached(id: AgentId, session: Option<Arc<dyn AgentSession>>, reason: &'static str) {
    let Some(session) = session else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = session.disconnect(reason).await {
            warn!(agent = id, error = %e, "failed to disconnect session");
        }
    });
}
