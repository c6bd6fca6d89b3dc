//! End-to-end behavior of the fleet runtime against simulated sessions.
//!
//! Time is paused, so every delay below is virtual and deterministic.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use craftfleet_daemon::config_manager::ConfigManager;
use craftfleet_daemon::handle::FleetHandle;
use craftfleet_daemon::runtime::FleetRuntime;
use craftfleet_daemon::session::ControlState;
use craftfleet_daemon::sim::{SimConnector, SimSession};
use craftfleet_types::{
    Activity, AgentRecord, AgentState, HistoryKind, InventoryItem, ServerConfig, SessionError,
    SimEntityConfig, SimulationConfig, TimingsConfig, HISTORY_CAPACITY,
};

struct Harness {
    handle: FleetHandle,
    sim: Arc<SimConnector>,
}

fn simulation() -> SimulationConfig {
    SimulationConfig {
        spawn_delay_ms: 100,
        blocks_per_sec: 10.0,
        inventory: vec![InventoryItem {
            name: "oak_log".into(),
            count: 12,
        }],
        entities: vec![
            SimEntityConfig {
                name: "Steve".into(),
                x: 5.0,
                y: 64.0,
                z: 0.0,
            },
            SimEntityConfig {
                name: "zombie".into(),
                x: 3.0,
                y: 64.0,
                z: 3.0,
            },
        ],
    }
}

fn start_with(server: ServerConfig) -> Harness {
    let sim = Arc::new(SimConnector::new(simulation()));
    let (handle, _task) = FleetRuntime::spawn(
        ConfigManager::new(server, None),
        TimingsConfig::default(),
        sim.clone(),
    );
    Harness { handle, sim }
}

fn start() -> Harness {
    start_with(ServerConfig::default())
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

impl Harness {
    async fn record(&self, id: u32) -> AgentRecord {
        self.handle.agent(id).await.unwrap().expect("agent registered")
    }

    /// Create an agent and wait for it to spawn.
    async fn connected(&self, id: u32) -> Arc<SimSession> {
        let record = self.handle.create_agent(id, None).await.unwrap();
        sleep_ms(150).await;
        assert_eq!(self.record(id).await.state, AgentState::Connected);
        self.sim.latest_session(&record.name).expect("session opened")
    }
}

#[tokio::test(start_paused = true)]
async fn created_agent_connects_and_is_counted() {
    let h = start();
    let record = h.handle.create_agent(1, None).await.unwrap();
    assert_eq!(record.name, "Bot_1");
    assert_eq!(record.state, AgentState::Connecting);
    assert_eq!(record.server, "localhost:25565");

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.total_created, 1);
    assert_eq!(stats.fleet_size, 1);
    assert_eq!(stats.active, 0);

    sleep_ms(150).await;
    let record = h.record(1).await;
    assert_eq!(record.state, AgentState::Connected);
    assert!(record.connected_at.is_some());
    assert_eq!(record.health, 20.0);
    assert_eq!(h.handle.stats().await.unwrap().active, 1);

    let history = h.handle.history(None).await.unwrap();
    assert!(history[0].message.contains("spawned"), "{:?}", history[0]);
}

#[tokio::test(start_paused = true)]
async fn custom_names_are_kept_and_blank_names_fall_back() {
    let h = start();
    let named = h.handle.create_agent(1, Some("Scout".into())).await.unwrap();
    assert_eq!(named.name, "Scout");
    let blank = h.handle.create_agent(2, Some("  ".into())).await.unwrap();
    assert_eq!(blank.name, "Bot_2");
}

#[tokio::test(start_paused = true)]
async fn capacity_is_enforced() {
    let h = start_with(ServerConfig {
        max_agents: 2,
        ..ServerConfig::default()
    });
    h.handle.create_agent(1, None).await.unwrap();
    h.handle.create_agent(2, None).await.unwrap();

    let err = h.handle.create_agent(3, None).await.unwrap_err();
    assert_eq!(err.code(), "capacity_exceeded");

    h.handle.remove_agent(1).await.unwrap();
    h.handle.create_agent(3, None).await.unwrap();
    assert_eq!(h.handle.stats().await.unwrap().fleet_size, 2);
}

#[tokio::test(start_paused = true)]
async fn create_many_stops_at_capacity() {
    let h = start_with(ServerConfig {
        max_agents: 3,
        ..ServerConfig::default()
    });
    let created = h.handle.create_agents(5).await.unwrap();
    let ids: Vec<u32> = created.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let err = h.handle.create_agents(1).await.unwrap_err();
    assert_eq!(err.code(), "capacity_exceeded");
}

#[tokio::test(start_paused = true)]
async fn live_duplicates_are_rejected_and_failed_records_superseded() {
    let h = start();
    h.connected(1).await;
    let err = h.handle.create_agent(1, None).await.unwrap_err();
    assert_eq!(err.code(), "duplicate_id");

    h.sim.set_offline(true);
    h.handle.create_agent(2, None).await.unwrap();
    sleep_ms(10).await;
    assert_eq!(h.record(2).await.state, AgentState::Error);
    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.active, 1);

    h.sim.set_offline(false);
    h.handle.create_agent(2, Some("Retry".into())).await.unwrap();
    sleep_ms(150).await;
    let record = h.record(2).await;
    assert_eq!(record.state, AgentState::Connected);
    assert_eq!(record.name, "Retry");
    assert_eq!(h.handle.stats().await.unwrap().total_created, 3);
}

#[tokio::test(start_paused = true)]
async fn connect_failure_is_recorded() {
    let h = start();
    h.sim.set_offline(true);
    h.handle.create_agent(1, None).await.unwrap();
    sleep_ms(10).await;

    assert_eq!(h.record(1).await.state, AgentState::Error);
    let history = h.handle.history(Some(1)).await.unwrap();
    assert_eq!(history[0].kind, HistoryKind::Error);
    assert!(history[0].message.contains("refused"));
}

#[tokio::test(start_paused = true)]
async fn commands_need_a_connected_session() {
    let h = start();
    h.sim.set_offline(true);
    h.handle.create_agent(1, None).await.unwrap();
    sleep_ms(10).await;

    let result = h
        .handle
        .execute(1, "move", json!({"x": 1, "y": 64, "z": 1}))
        .await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("agent_unavailable"));

    let result = h.handle.execute(9, "jump", json!(null)).await;
    assert_eq!(result.error.as_deref(), Some("agent_unavailable"));

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.movements, 0);
    assert_eq!(stats.commands_executed, 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_commands_and_bad_params_have_no_side_effects() {
    let h = start();
    h.connected(1).await;
    let history_before = h.handle.history(None).await.unwrap().len();

    let result = h.handle.execute(1, "dance", json!({})).await;
    assert_eq!(result.error.as_deref(), Some("unknown_command"));
    let result = h.handle.execute(1, "move", json!({"x": "far"})).await;
    assert_eq!(result.error.as_deref(), Some("invalid_params"));

    assert_eq!(h.handle.stats().await.unwrap().commands_executed, 0);
    assert_eq!(h.handle.history(None).await.unwrap().len(), history_before);
}

#[tokio::test(start_paused = true)]
async fn missing_attack_target_is_not_an_error() {
    let h = start();
    h.connected(1).await;

    let result = h.handle.execute(1, "attack", json!({"target": "Ghost"})).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("target_not_found"));

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.commands_executed, 1);
    assert_eq!(stats.errors, 0);

    let history = h.handle.history(Some(1)).await.unwrap();
    assert_eq!(history[0].kind, HistoryKind::Command);
    assert_eq!(history[0].message, "Bot_1: attack Ghost");
}

#[tokio::test(start_paused = true)]
async fn attack_holds_activity_then_reverts() {
    let h = start();
    let session = h.connected(1).await;

    let result = h.handle.execute(1, "attack", json!({"target": "zombie"})).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(session.attacks(), vec!["zombie".to_string()]);
    assert_eq!(
        h.record(1).await.activity,
        Activity::Attacking("zombie".into())
    );

    sleep_ms(3_100).await;
    assert_eq!(h.record(1).await.activity, Activity::Idle);
}

#[tokio::test(start_paused = true)]
async fn newer_move_cancels_the_older_one() {
    let h = start();
    h.connected(1).await;

    let first = tokio::spawn({
        let handle = h.handle.clone();
        async move {
            handle
                .execute(1, "move", json!({"x": 100, "y": 64, "z": 0}))
                .await
        }
    });
    sleep_ms(50).await;
    assert_eq!(h.record(1).await.activity, Activity::Moving);

    let second = h
        .handle
        .execute(1, "move", json!({"x": 10, "y": 64, "z": 0}))
        .await;
    let first = first.await.unwrap();

    assert!(second.success, "{}", second.message);
    assert!(!first.success);
    assert_eq!(first.error.as_deref(), Some("session_error"));

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.movements, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.commands_executed, 2);
    assert_eq!(h.record(1).await.activity, Activity::Idle);
}

#[tokio::test(start_paused = true)]
async fn vitals_refresh_tracks_position() {
    let h = start();
    h.connected(1).await;

    let result = h
        .handle
        .execute(1, "move", json!({"x": 10, "y": 64, "z": 0}))
        .await;
    assert!(result.success);
    sleep_ms(1_100).await;

    let record = h.record(1).await;
    assert!((record.position.x - 8.0).abs() < 1e-6, "{}", record.position);
    assert_eq!(record.position.y, 64.0);
}

#[tokio::test(start_paused = true)]
async fn kick_triggers_exactly_one_reconnect() {
    let h = start();
    let session = h.connected(1).await;

    session.kick("flying is not enabled");
    sleep_ms(50).await;
    assert_eq!(h.record(1).await.state, AgentState::Disconnected);
    let history = h.handle.history(None).await.unwrap();
    assert!(history
        .iter()
        .any(|e| e.message == "Bot_1 was kicked: flying is not enabled"));

    sleep_ms(9_900).await;
    assert_eq!(h.record(1).await.state, AgentState::Disconnected);
    sleep_ms(100).await;
    assert_eq!(h.record(1).await.state, AgentState::Connecting);
    sleep_ms(150).await;
    assert_eq!(h.record(1).await.state, AgentState::Connected);

    sleep_ms(30_000).await;
    assert_eq!(h.sim.sessions().len(), 2);
    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.total_created, 2);
    assert_eq!(stats.active, 1);
}

#[tokio::test(start_paused = true)]
async fn removed_agents_are_not_resurrected() {
    let h = start();
    let session = h.connected(1).await;
    session.kick("bye");
    sleep_ms(1_000).await;

    h.handle.remove_agent(1).await.unwrap();
    sleep_ms(15_000).await;

    assert!(h.handle.agent(1).await.unwrap().is_none());
    assert_eq!(h.sim.sessions().len(), 1);
    assert_eq!(h.handle.stats().await.unwrap().total_created, 1);
}

#[tokio::test(start_paused = true)]
async fn kick_without_auto_reconnect_stays_down() {
    let h = start_with(ServerConfig {
        auto_reconnect: false,
        ..ServerConfig::default()
    });
    let session = h.connected(1).await;
    session.kick("bye");
    sleep_ms(15_000).await;

    assert_eq!(h.record(1).await.state, AgentState::Disconnected);
    assert_eq!(h.sim.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn death_does_not_reconnect() {
    let h = start();
    let session = h.connected(1).await;
    session.die();
    sleep_ms(15_000).await;

    assert_eq!(h.record(1).await.state, AgentState::Dead);
    assert_eq!(h.sim.sessions().len(), 1);
    assert_eq!(h.handle.stats().await.unwrap().active, 0);
}

#[tokio::test(start_paused = true)]
async fn pending_reconnect_skips_a_superseded_record() {
    let h = start();
    let kicked = h.connected(1).await;
    kicked.kick("bye");
    sleep_ms(50).await;
    assert_eq!(h.record(1).await.state, AgentState::Disconnected);

    let replacement = h.connected(1).await;
    replacement.die();
    sleep_ms(10_000).await;

    assert_eq!(h.record(1).await.state, AgentState::Dead);
    assert_eq!(h.sim.sessions().len(), 2);
    assert_eq!(h.handle.stats().await.unwrap().total_created, 2);
}

#[tokio::test(start_paused = true)]
async fn pending_migration_skips_a_recreated_record() {
    let h = start();
    h.connected(1).await;
    h.handle
        .update_config(json!({
            "host": "play.example.net",
            "port": 25565,
            "protocol_version": "1.20.4",
        }))
        .await
        .unwrap();
    h.handle.remove_agent(1).await.unwrap();

    h.sim.set_offline(true);
    h.handle.create_agent(1, None).await.unwrap();
    sleep_ms(150).await;
    assert_eq!(h.record(1).await.state, AgentState::Error);

    sleep_ms(5_000).await;
    assert_eq!(h.record(1).await.state, AgentState::Error);
    assert_eq!(h.handle.stats().await.unwrap().total_created, 2);
}

#[tokio::test(start_paused = true)]
async fn server_change_migrates_connected_agents() {
    let h = start();
    h.handle.create_agents(3).await.unwrap();
    sleep_ms(150).await;
    let old_sessions = h.sim.sessions();

    let config = h
        .handle
        .update_config(json!({
            "host": "play.example.net",
            "port": 25570,
            "protocol_version": "1.20.4",
        }))
        .await
        .unwrap();
    assert_eq!(config.address(), "play.example.net:25570");
    assert_eq!(h.record(3).await.state, AgentState::Disconnected);

    sleep_ms(1_990).await;
    assert_eq!(h.record(3).await.state, AgentState::Disconnected);
    sleep_ms(20).await;
    let record = h.record(3).await;
    assert_eq!(record.state, AgentState::Connecting);
    assert_eq!(record.server, "play.example.net:25570");

    sleep_ms(150).await;
    assert_eq!(h.handle.stats().await.unwrap().active, 3);
    assert!(old_sessions.iter().all(|s| s.is_closed()));
    let session = h.sim.latest_session("Bot_3").unwrap();
    assert_eq!(session.server(), "play.example.net:25570");

    let history = h.handle.history(None).await.unwrap();
    assert!(history
        .iter()
        .any(|e| e.message.contains("migrating 3 agent(s)")));
}

#[tokio::test(start_paused = true)]
async fn invalid_server_config_changes_nothing() {
    let h = start();
    h.connected(1).await;

    let err = h
        .handle
        .update_config(json!({"host": "", "port": 25565, "protocol_version": "1.20.4"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "config_invalid");

    let err = h
        .handle
        .update_config(json!({"host": "example.net"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "config_invalid");

    assert_eq!(h.handle.config().await.unwrap().host, "localhost");
    sleep_ms(3_000).await;
    assert_eq!(h.record(1).await.state, AgentState::Connected);
    assert_eq!(h.sim.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn history_keeps_the_newest_entries() {
    let h = start();
    h.connected(1).await;

    for i in 0..60 {
        let result = h
            .handle
            .execute(1, "chat", json!({"message": format!("line {i}")}))
            .await;
        assert!(result.success);
    }

    let history = h.handle.history(None).await.unwrap();
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert_eq!(history[0].message, "Bot_1: chat line 59");
    assert!(history
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
    assert_eq!(h.handle.history(Some(5)).await.unwrap().len(), 5);
    assert_eq!(h.handle.stats().await.unwrap().messages_sent, 60);
}

#[tokio::test(start_paused = true)]
async fn chat_from_others_is_recorded_but_not_own_echo() {
    let h = start();
    let session = h.connected(1).await;

    session.hear("Steve", "hello bots");
    sleep_ms(10).await;
    let head = h.handle.history(Some(1)).await.unwrap().remove(0);
    assert_eq!(head.kind, HistoryKind::Chat);
    assert_eq!(head.message, "<Steve> hello bots");

    session.hear("Bot_1", "echo");
    sleep_ms(10).await;
    let head = h.handle.history(Some(1)).await.unwrap().remove(0);
    assert_eq!(head.message, "<Steve> hello bots");
}

#[tokio::test(start_paused = true)]
async fn welcome_line_is_sent_after_spawn() {
    let h = start();
    let session = h.connected(1).await;
    assert!(session.chat_log().is_empty());

    sleep_ms(2_000).await;
    assert_eq!(session.chat_log(), vec!["Hello! Bot_1 reporting in.".to_string()]);
    assert_eq!(h.handle.stats().await.unwrap().messages_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn broadcast_reaches_every_agent() {
    let h = start();
    h.connected(1).await;
    h.connected(2).await;

    let results = h
        .handle
        .broadcast("chat", json!({"message": "hi all"}))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.result.success));
    assert_eq!(h.handle.stats().await.unwrap().messages_sent, 2);
}

#[tokio::test(start_paused = true)]
async fn inventory_returns_items() {
    let h = start();
    h.connected(1).await;

    let result = h.handle.execute(1, "inventory", json!(null)).await;
    assert!(result.success);
    assert_eq!(
        result.data.unwrap(),
        json!([{"name": "oak_log", "count": 12}])
    );
}

#[tokio::test(start_paused = true)]
async fn follow_then_stop() {
    let h = start();
    let session = h.connected(1).await;

    let result = h.handle.execute(1, "follow", json!({"player": "Steve"})).await;
    assert!(result.success);
    assert_eq!(session.following().as_deref(), Some("Steve"));
    assert_eq!(h.record(1).await.activity, Activity::Following("Steve".into()));

    let result = h.handle.execute(1, "stop", json!(null)).await;
    assert!(result.success);
    assert_eq!(session.following(), None);
    assert_eq!(h.record(1).await.activity, Activity::Idle);
}

#[tokio::test(start_paused = true)]
async fn gestures_expire_after_a_second() {
    let h = start();
    let session = h.connected(1).await;

    let result = h
        .handle
        .execute(1, "look", json!({"yaw": 1.0, "pitch": 0.5}))
        .await;
    assert!(result.success);
    assert_eq!(session.looks(), vec![(1.0, 0.5)]);
    assert_eq!(h.record(1).await.activity, Activity::Looking);

    let result = h.handle.execute(1, "jump", json!(null)).await;
    assert!(result.success);
    assert_eq!(
        session.controls(),
        vec![(ControlState::Jump, true), (ControlState::Jump, false)]
    );
    assert_eq!(h.record(1).await.activity, Activity::Jumping);

    sleep_ms(1_000).await;
    assert_eq!(h.record(1).await.activity, Activity::Idle);
}

#[tokio::test(start_paused = true)]
async fn session_failures_are_counted() {
    let h = start();
    let session = h.connected(1).await;
    session.fail_next(SessionError::Io("socket reset".into()));

    let result = h.handle.execute(1, "chat", json!({"message": "hi"})).await;
    assert_eq!(result.error.as_deref(), Some("session_error"));

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.messages_sent, 0);
    let head = h.handle.history(Some(1)).await.unwrap().remove(0);
    assert_eq!(head.kind, HistoryKind::Error);
}

#[tokio::test(start_paused = true)]
async fn command_settling_after_removal_reports_unavailable() {
    let h = start();
    h.connected(1).await;

    let pending = tokio::spawn({
        let handle = h.handle.clone();
        async move {
            handle
                .execute(1, "move", json!({"x": 100, "y": 64, "z": 0}))
                .await
        }
    });
    sleep_ms(50).await;
    h.handle.remove_agent(1).await.unwrap();

    let result = pending.await.unwrap();
    assert_eq!(result.error.as_deref(), Some("agent_unavailable"));
    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.movements, 0);
}

#[tokio::test(start_paused = true)]
async fn connection_lost_mid_command_reports_unavailable() {
    let h = start();
    let session = h.connected(1).await;

    let pending = tokio::spawn({
        let handle = h.handle.clone();
        async move {
            handle
                .execute(1, "move", json!({"x": 100, "y": 64, "z": 0}))
                .await
        }
    });
    sleep_ms(50).await;
    session.drop_connection("timed out");

    let result = pending.await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("agent_unavailable"));
    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.movements, 0);
    let history = h.handle.history(None).await.unwrap();
    assert!(history.iter().all(|e| e.kind != HistoryKind::Error));
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_disables_commands() {
    let h = start();
    let session = h.connected(1).await;
    session.drop_connection("timed out");
    sleep_ms(10).await;

    assert_eq!(h.record(1).await.state, AgentState::Disconnected);
    let result = h.handle.execute(1, "jump", json!(null)).await;
    assert_eq!(result.error.as_deref(), Some("agent_unavailable"));
    sleep_ms(15_000).await;
    assert_eq!(h.sim.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_all_and_shutdown() {
    let h = start();
    h.handle.create_agents(4).await.unwrap();
    sleep_ms(150).await;

    assert_eq!(h.handle.stop_all().await.unwrap(), 4);
    assert!(h.handle.list_agents().await.unwrap().is_empty());
    sleep_ms(10).await;
    assert!(h.sim.sessions().iter().all(|s| s.is_closed()));

    h.handle.create_agent(7, None).await.unwrap();
    h.handle.shutdown().await.unwrap();
    h.handle.stopped().await;
    assert_eq!(
        h.handle.stats().await.unwrap_err().code(),
        "runtime_closed"
    );
}
