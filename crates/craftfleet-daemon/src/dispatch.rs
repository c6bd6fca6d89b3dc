//! Command dispatcher.
//!
//! Dispatch is split in two. [`plan`] runs on the runtime task before any
//! I/O: it resolves random look angles and reports the activity the agent
//! enters immediately. [`perform`] runs in a spawned task against the
//! session and reports what to record once it settles.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::time::Duration;

use rand::Rng;

use craftfleet_types::{Activity, Command, FleetError, Position};

use crate::session::{AgentSession, ControlState};

/// Arrival radius for `move` goals.
pub const MOVE_RADIUS: f64 = 2.0;
/// Distance kept while following a player.
pub const FOLLOW_RADIUS: f64 = 3.0;
/// How long the jump control stays pressed.
pub const JUMP_HOLD: Duration = Duration::from_millis(300);
/// How long `jumping` and `looking` are shown.
pub const GESTURE_ACTIVITY: Duration = Duration::from_secs(1);
/// How long `attacking <target>` is shown.
pub const ATTACK_ACTIVITY: Duration = Duration::from_secs(3);

/// Activity entered when a command is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Opening {
    pub activity: Activity,
    /// Revert to idle after this long, unless superseded.
    pub expires: Option<Duration>,
}

/// A command ready to run, with randomness already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub command: Command,
    pub opening: Option<Opening>,
}

/// Counter credited when a command succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    MessagesSent,
    Movements,
}

/// Activity update applied when a command settles successfully.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityChange {
    Keep,
    /// Reset the opening activity to idle if nothing replaced it.
    EndOpening,
    Set(Activity),
    /// Set, then revert to idle after the duration unless superseded.
    Hold(Activity, Duration),
}

/// Outcome of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub activity: ActivityChange,
    pub counter: Option<Counter>,
}

impl Completion {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            activity: ActivityChange::Keep,
            counter: None,
        }
    }

    fn activity(mut self, change: ActivityChange) -> Self {
        self.activity = change;
        self
    }

    fn counter(mut self, counter: Counter) -> Self {
        self.counter = Some(counter);
        self
    }
}

/// Resolve defaults and decide the opening activity.
pub fn plan(command: Command) -> Plan {
    match command {
        Command::Look { yaw, pitch } => {
            let mut rng = rand::thread_rng();
            let yaw = yaw.unwrap_or_else(|| rng.gen_range(0.0..TAU));
            let pitch = pitch.unwrap_or_else(|| rng.gen_range(-FRAC_PI_2..FRAC_PI_2));
            Plan {
                command: Command::Look {
                    yaw: Some(yaw),
                    pitch: Some(pitch),
                },
                opening: Some(Opening {
                    activity: Activity::Looking,
                    expires: Some(GESTURE_ACTIVITY),
                }),
            }
        }
        Command::Move { .. } => Plan {
            command,
            opening: Some(Opening {
                activity: Activity::Moving,
                expires: None,
            }),
        },
        Command::Jump => Plan {
            command,
            opening: Some(Opening {
                activity: Activity::Jumping,
                expires: Some(GESTURE_ACTIVITY),
            }),
        },
        other => Plan {
            command: other,
            opening: None,
        },
    }
}

/// Execute a planned command against a session.
pub async fn perform(
    session: &dyn AgentSession,
    command: &Command,
) -> Result<Completion, FleetError> {
    match command {
        Command::Chat { message } => {
            session.chat(message).await?;
            Ok(Completion::new("message sent").counter(Counter::MessagesSent))
        }
        Command::Move { x, y, z } => {
            let target = Position::new(*x, *y, *z);
            session.cancel_goal();
            session.set_motion_goal(target, MOVE_RADIUS).await?;
            Ok(Completion::new(format!("arrived near {target}"))
                .activity(ActivityChange::EndOpening)
                .counter(Counter::Movements))
        }
        Command::Follow { player } => {
            let entity = session
                .find_entity_by_name(player)
                .ok_or_else(|| FleetError::TargetNotFound(player.clone()))?;
            session.cancel_goal();
            session.set_follow_goal(&entity, FOLLOW_RADIUS).await?;
            Ok(Completion::new(format!("following {player}"))
                .activity(ActivityChange::Set(Activity::Following(player.clone()))))
        }
        Command::Stop => {
            session.cancel_goal();
            Ok(Completion::new("stopped").activity(ActivityChange::Set(Activity::Idle)))
        }
        Command::Jump => {
            session.set_control_state(ControlState::Jump, true).await?;
            tokio::time::sleep(JUMP_HOLD).await;
            session.set_control_state(ControlState::Jump, false).await?;
            Ok(Completion::new("jumped"))
        }
        Command::Look { yaw, pitch } => {
            let (yaw, pitch) = (yaw.unwrap_or_default(), pitch.unwrap_or_default());
            session.look(yaw, pitch).await?;
            Ok(Completion::new(format!("looking at yaw {yaw:.2}, pitch {pitch:.2}")))
        }
        Command::Inventory => {
            let items = session.query_inventory().await?;
            let mut completion = Completion::new(format!("{} item stacks", items.len()));
            completion.data = serde_json::to_value(&items).ok();
            Ok(completion)
        }
        Command::Attack { target } => {
            let entity = session
                .find_entity_by_name(target)
                .ok_or_else(|| FleetError::TargetNotFound(target.clone()))?;
            session.attack(&entity).await?;
            Ok(Completion::new(format!("attacking {target}")).activity(ActivityChange::Hold(
                Activity::Attacking(target.clone()),
                ATTACK_ACTIVITY,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use craftfleet_types::{InventoryItem, ServerConfig, SimEntityConfig, SimulationConfig};

    use crate::session::SessionConnector;
    use crate::sim::{SimConnector, SimSession};

    async fn session() -> (Arc<dyn AgentSession>, Arc<SimSession>) {
        let connector = SimConnector::new(SimulationConfig {
            spawn_delay_ms: 0,
            blocks_per_sec: 10.0,
            inventory: vec![InventoryItem {
                name: "oak_log".into(),
                count: 12,
            }],
            entities: vec![SimEntityConfig {
                name: "zombie".into(),
                x: 3.0,
                y: 64.0,
                z: 0.0,
            }],
        });
        let handle = connector
            .connect(&ServerConfig::default(), "Bot_1")
            .await
            .unwrap();
        let sim = connector.latest_session("Bot_1").unwrap();
        (handle.session, sim)
    }

    #[test]
    fn look_angles_are_resolved_within_range() {
        for _ in 0..100 {
            let plan = plan(Command::Look {
                yaw: None,
                pitch: None,
            });
            let Command::Look {
                yaw: Some(yaw),
                pitch: Some(pitch),
            } = plan.command
            else {
                panic!("look angles not resolved");
            };
            assert!((0.0..TAU).contains(&yaw));
            assert!((-FRAC_PI_2..FRAC_PI_2).contains(&pitch));
        }
    }

    #[test]
    fn explicit_look_angles_are_kept() {
        let plan = plan(Command::Look {
            yaw: Some(1.0),
            pitch: None,
        });
        assert!(matches!(plan.command, Command::Look { yaw: Some(y), pitch: Some(_) } if y == 1.0));
    }

    #[test]
    fn openings() {
        assert_eq!(
            plan(Command::Jump).opening,
            Some(Opening {
                activity: Activity::Jumping,
                expires: Some(GESTURE_ACTIVITY),
            })
        );
        assert_eq!(
            plan(Command::Move {
                x: 1.0,
                y: 2.0,
                z: 3.0
            })
            .opening
            .map(|o| o.activity),
            Some(Activity::Moving)
        );
        assert!(plan(Command::Stop).opening.is_none());
        assert!(plan(Command::Attack {
            target: "zombie".into()
        })
        .opening
        .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn jump_presses_and_releases() {
        let (session, sim) = session().await;
        let done = perform(session.as_ref(), &Command::Jump).await.unwrap();
        assert_eq!(done.activity, ActivityChange::Keep);
        assert_eq!(
            sim.controls(),
            vec![(ControlState::Jump, true), (ControlState::Jump, false)]
        );
    }

    #[tokio::test]
    async fn attack_missing_target() {
        let (session, sim) = session().await;
        let err = perform(
            session.as_ref(),
            &Command::Attack {
                target: "Ghost".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err, FleetError::TargetNotFound("Ghost".into()));
        assert!(sim.attacks().is_empty());
    }

    #[tokio::test]
    async fn attack_holds_activity() {
        let (session, _sim) = session().await;
        let done = perform(
            session.as_ref(),
            &Command::Attack {
                target: "zombie".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            done.activity,
            ActivityChange::Hold(Activity::Attacking("zombie".into()), ATTACK_ACTIVITY)
        );
        assert!(done.counter.is_none());
    }

    #[tokio::test]
    async fn inventory_returns_items() {
        let (session, _sim) = session().await;
        let done = perform(session.as_ref(), &Command::Inventory).await.unwrap();
        assert_eq!(
            done.data,
            Some(serde_json::json!([{"name": "oak_log", "count": 12}]))
        );
    }

    #[tokio::test]
    async fn chat_counts_messages() {
        let (session, sim) = session().await;
        let done = perform(
            session.as_ref(),
            &Command::Chat {
                message: "hello world".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(done.counter, Some(Counter::MessagesSent));
        assert_eq!(sim.chat_log(), vec!["hello world".to_string()]);
    }

    #[tokio::test]
    async fn follow_sets_goal() {
        let (session, sim) = session().await;
        let done = perform(
            session.as_ref(),
            &Command::Follow {
                player: "zombie".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            done.activity,
            ActivityChange::Set(Activity::Following("zombie".into()))
        );
        assert_eq!(sim.following().as_deref(), Some("zombie"));

        perform(session.as_ref(), &Command::Stop).await.unwrap();
        assert!(sim.following().is_none());
    }
}
