//! In-process simulated session backend.
//!
//! [`SimConnector`] stands in for a real protocol client: sessions spawn
//! after a short delay, motion goals take travel time proportional to
//! distance, newer goals cancel older ones, and a fixed set of entities and
//! items is visible to every agent. Scripted events (kick, death, chat,
//! errors) can be injected through [`SimSession`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use craftfleet_types::{InventoryItem, Position, ServerConfig, SessionError, SimulationConfig};

use crate::session::{
    AgentSession, ControlState, Entity, SessionConnector, SessionEvent, SessionHandle, Vitals,
};

const SPAWN_POINT: Position = Position {
    x: 0.0,
    y: 64.0,
    z: 0.0,
};

/// Connector producing [`SimSession`]s.
pub struct SimConnector {
    settings: SimulationConfig,
    offline: AtomicBool,
    next_entity_id: AtomicU64,
    sessions: Mutex<Vec<Arc<SimSession>>>,
}

impl SimConnector {
    pub fn new(settings: SimulationConfig) -> Self {
        Self {
            settings,
            offline: AtomicBool::new(false),
            next_entity_id: AtomicU64::new(1),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// While offline, every connection attempt is refused.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Every session opened so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<SimSession>> {
        lock(&self.sessions).clone()
    }

    /// The most recently opened session for an agent name.
    pub fn latest_session(&self, name: &str) -> Option<Arc<SimSession>> {
        lock(&self.sessions)
            .iter()
            .rev()
            .find(|s| s.name() == name)
            .cloned()
    }

    fn initial_entities(&self) -> Vec<Entity> {
        self.settings
            .entities
            .iter()
            .map(|e| Entity {
                id: self.next_entity_id.fetch_add(1, Ordering::Relaxed),
                name: e.name.clone(),
                position: Position::new(e.x, e.y, e.z),
            })
            .collect()
    }
}

#[async_trait]
impl SessionConnector for SimConnector {
    async fn connect(
        &self,
        server: &ServerConfig,
        name: &str,
    ) -> Result<SessionHandle, SessionError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(SessionError::Connect(format!(
                "{} refused the connection",
                server.address()
            )));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(SimSession::new(
            name,
            server.address(),
            self.settings.blocks_per_sec,
            self.settings.inventory.clone(),
            self.initial_entities(),
            events_tx,
        ));
        lock(&self.sessions).push(Arc::clone(&session));

        let spawn_delay = Duration::from_millis(self.settings.spawn_delay_ms);
        let spawning = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(spawn_delay).await;
            if !spawning.is_closed() {
                spawning.emit(SessionEvent::Spawned);
            }
        });

        debug!(agent = name, server = %server.address(), "simulated session opened");
        Ok(SessionHandle {
            session,
            events: events_rx,
        })
    }
}

struct World {
    position: Position,
    health: f32,
    food: f32,
    inventory: Vec<InventoryItem>,
    entities: Vec<Entity>,
    following: Option<String>,
    controls: Vec<(ControlState, bool)>,
    looks: Vec<(f64, f64)>,
    attacks: Vec<String>,
    chat_log: Vec<String>,
    fail_next: Option<SessionError>,
}

/// One simulated agent connection.
pub struct SimSession {
    name: String,
    server: String,
    speed: f64,
    events: mpsc::UnboundedSender<SessionEvent>,
    world: Mutex<World>,
    goal_epoch: watch::Sender<u64>,
    closed: AtomicBool,
}

impl SimSession {
    fn new(
        name: &str,
        server: String,
        speed: f64,
        inventory: Vec<InventoryItem>,
        entities: Vec<Entity>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (goal_epoch, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            server,
            speed,
            events,
            world: Mutex::new(World {
                position: SPAWN_POINT,
                health: 20.0,
                food: 20.0,
                inventory,
                entities,
                following: None,
                controls: Vec::new(),
                looks: Vec::new(),
                attacks: Vec::new(),
                chat_log: Vec::new(),
                fail_next: None,
            }),
            goal_epoch,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target server as `host:port`.
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Push a raw event to the fleet.
    pub fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(agent = %self.name, "simulated event dropped, receiver gone");
        }
    }

    /// Another player speaks.
    pub fn hear(&self, from: &str, text: &str) {
        self.emit(SessionEvent::Chat {
            from: from.to_string(),
            text: text.to_string(),
        });
    }

    /// Kick the agent: `Kicked` followed by `Ended`.
    pub fn kick(&self, reason: &str) {
        self.emit(SessionEvent::Kicked {
            reason: reason.to_string(),
        });
        self.close(reason);
    }

    pub fn die(&self) {
        self.emit(SessionEvent::Died);
    }

    /// The connection drops without a kick.
    pub fn drop_connection(&self, reason: &str) {
        self.close(reason);
    }

    /// Make the next action fail with `error`.
    pub fn fail_next(&self, error: SessionError) {
        self.world().fail_next = Some(error);
    }

    pub fn add_entity(&self, name: &str, position: Position) {
        let mut world = self.world();
        let id = world.entities.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        world.entities.push(Entity {
            id,
            name: name.to_string(),
            position,
        });
    }

    pub fn chat_log(&self) -> Vec<String> {
        self.world().chat_log.clone()
    }

    pub fn attacks(&self) -> Vec<String> {
        self.world().attacks.clone()
    }

    pub fn looks(&self) -> Vec<(f64, f64)> {
        self.world().looks.clone()
    }

    pub fn controls(&self) -> Vec<(ControlState, bool)> {
        self.world().controls.clone()
    }

    pub fn following(&self) -> Option<String> {
        self.world().following.clone()
    }

    fn world(&self) -> MutexGuard<'_, World> {
        lock(&self.world)
    }

    fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.bump_goal();
        self.emit(SessionEvent::Ended {
            reason: reason.to_string(),
        });
    }

    fn bump_goal(&self) {
        self.goal_epoch.send_modify(|epoch| *epoch += 1);
        self.world().following = None;
    }

    /// Fails when closed or when a failure was scripted.
    fn check(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        match self.world().fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn travel_time(&self, from: &Position, to: &Position, radius: f64) -> Duration {
        let distance = (from.distance_to(to) - radius).max(0.0);
        if self.speed <= 0.0 || distance == 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(distance / self.speed).unwrap_or(Duration::MAX)
    }
}

#[async_trait]
impl AgentSession for SimSession {
    async fn chat(&self, message: &str) -> Result<(), SessionError> {
        self.check()?;
        self.world().chat_log.push(message.to_string());
        Ok(())
    }

    async fn set_motion_goal(&self, target: Position, radius: f64) -> Result<(), SessionError> {
        self.check()?;
        let mut epoch = self.goal_epoch.subscribe();
        self.bump_goal();
        epoch.borrow_and_update();

        let start = self.world().position;
        let travel = self.travel_time(&start, &target, radius);

        tokio::select! {
            _ = tokio::time::sleep(travel) => {
                let mut world = self.world();
                let distance = start.distance_to(&target);
                world.position = if distance > radius && distance > 0.0 {
                    let keep = radius / distance;
                    Position::new(
                        target.x + (start.x - target.x) * keep,
                        target.y + (start.y - target.y) * keep,
                        target.z + (start.z - target.z) * keep,
                    )
                } else {
                    start
                };
                Ok(())
            }
            _ = epoch.changed() => {
                if self.is_closed() {
                    Err(SessionError::Closed)
                } else {
                    Err(SessionError::GoalCancelled)
                }
            }
        }
    }

    async fn set_follow_goal(&self, entity: &Entity, _radius: f64) -> Result<(), SessionError> {
        self.check()?;
        self.bump_goal();
        self.world().following = Some(entity.name.clone());
        Ok(())
    }

    fn cancel_goal(&self) {
        self.bump_goal();
    }

    async fn set_control_state(
        &self,
        control: ControlState,
        active: bool,
    ) -> Result<(), SessionError> {
        self.check()?;
        self.world().controls.push((control, active));
        Ok(())
    }

    async fn look(&self, yaw: f64, pitch: f64) -> Result<(), SessionError> {
        self.check()?;
        self.world().looks.push((yaw, pitch));
        Ok(())
    }

    async fn query_inventory(&self) -> Result<Vec<InventoryItem>, SessionError> {
        self.check()?;
        Ok(self.world().inventory.clone())
    }

    fn find_entity_by_name(&self, name: &str) -> Option<Entity> {
        if self.is_closed() {
            return None;
        }
        let world = self.world();
        let here = world.position;
        world
            .entities
            .iter()
            .filter(|e| e.name == name)
            .min_by(|a, b| {
                here.distance_to(&a.position)
                    .total_cmp(&here.distance_to(&b.position))
            })
            .cloned()
    }

    async fn attack(&self, entity: &Entity) -> Result<(), SessionError> {
        self.check()?;
        let mut world = self.world();
        if !world.entities.iter().any(|e| e.id == entity.id) {
            return Err(SessionError::Io(format!("{} is no longer visible", entity.name)));
        }
        world.attacks.push(entity.name.clone());
        Ok(())
    }

    fn vitals(&self) -> Vitals {
        let world = self.world();
        Vitals {
            position: world.position,
            health: world.health,
            food: world.food,
        }
    }

    async fn disconnect(&self, reason: &str) -> Result<(), SessionError> {
        self.close(reason);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
