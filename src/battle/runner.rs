use log::{info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use super::{
    ActionOutcome, BattleEngine, BattleLogLine, BattleView, OpponentSpec, PlayerAction,
    PlayerVitals, Resolution, Reward,
};
use crate::api::{GameApi, PlayerProfile};
use crate::config::BattleConfig;
use crate::errors::ClientError;
use crate::logutil::escape_log;
use crate::metrics;
use crate::session::SessionContext;

const LOG_TARGET: &str = "questroom::battle";

/// Delays that pace an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleTiming {
    pub opponent_delay: Duration,
    pub victory_display: Duration,
    pub defeat_display: Duration,
    pub escape_display: Duration,
}

impl BattleTiming {
    pub fn from_config(cfg: &BattleConfig) -> Self {
        Self {
            opponent_delay: Duration::from_millis(cfg.opponent_delay_ms),
            victory_display: Duration::from_millis(cfg.victory_display_ms),
            defeat_display: Duration::from_millis(cfg.defeat_display_ms),
            escape_display: Duration::from_millis(cfg.escape_display_ms),
        }
    }

    fn display_for(&self, resolution: Resolution) -> Duration {
        match resolution {
            Resolution::Victory => self.victory_display,
            Resolution::Defeat => self.defeat_display,
            Resolution::Escaped => self.escape_display,
        }
    }
}

impl Default for BattleTiming {
    fn default() -> Self {
        Self::from_config(&BattleConfig::default())
    }
}

#[derive(Debug, Clone)]
pub enum BattleUpdate {
    Log(Vec<BattleLogLine>),
    Vitals(BattleView),
    Resolved(Resolution),
    RewardGranted {
        reward: Reward,
        profile: PlayerProfile,
    },
    RewardFailed(String),
    /// The display delay elapsed; the battle view should close.
    ReturnToAmbient,
}

enum BattleCommand {
    Act(PlayerAction, oneshot::Sender<ActionOutcome>),
    View(oneshot::Sender<BattleView>),
    Abort(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct BattleHandle {
    tx: mpsc::UnboundedSender<BattleCommand>,
}

impl BattleHandle {
    /// Apply a player action. Returns [`ActionOutcome::Rejected`] when it is
    /// not the player's turn or the battle is over.
    pub async fn act(&self, action: PlayerAction) -> ActionOutcome {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(BattleCommand::Act(action, tx)).is_err() {
            return ActionOutcome::Rejected;
        }
        rx.await.unwrap_or(ActionOutcome::Rejected)
    }

    pub async fn view(&self) -> Option<BattleView> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(BattleCommand::View(tx)).ok()?;
        rx.await.ok()
    }

    /// End the encounter without a resolution and cancel its timers.
    pub async fn abort(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(BattleCommand::Abort(tx));
        let _ = rx.await;
    }

    /// Like [`BattleHandle::abort`] but does not wait for the task.
    pub fn cancel(&self) {
        let (tx, _) = oneshot::channel();
        let _ = self.tx.send(BattleCommand::Abort(tx));
    }

    pub fn is_finished(&self) -> bool {
        self.tx.is_closed()
    }
}

struct BattleTask<A: GameApi, R: Rng> {
    engine: BattleEngine,
    rng: R,
    timing: BattleTiming,
    api: Arc<A>,
    session: Arc<SessionContext>,
    updates: mpsc::UnboundedSender<BattleUpdate>,
    log_cursor: usize,
    opponent_due: Option<Instant>,
    ambient_due: Option<Instant>,
}

impl<A: GameApi, R: Rng + Send + 'static> BattleTask<A, R> {
    fn opponent_name(&self) -> String {
        self.engine
            .opponent()
            .map(|o| o.spec.name.clone())
            .unwrap_or_default()
    }

    fn flush(&mut self) {
        let lines = self.engine.log();
        if self.log_cursor < lines.len() {
            let fresh = lines[self.log_cursor..].to_vec();
            self.log_cursor = lines.len();
            let _ = self.updates.send(BattleUpdate::Log(fresh));
        }
        let _ = self.updates.send(BattleUpdate::Vitals(self.engine.view()));
    }

    async fn apply(&mut self, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Rejected => return,
            ActionOutcome::OpponentTurn => {
                self.opponent_due = Some(Instant::now() + self.timing.opponent_delay);
            }
            ActionOutcome::PlayerTurn => {}
            ActionOutcome::Resolved(_) => {}
        }
        self.flush();
        if let ActionOutcome::Resolved(resolution) = outcome {
            self.finish(resolution).await;
        }
    }

    async fn finish(&mut self, resolution: Resolution) {
        self.opponent_due = None;
        let name = self.opponent_name();
        let counters = metrics::record_battle_end(&name, resolution);
        info!(
            target: LOG_TARGET,
            "battle.end opponent={} outcome={:?} victories={} defeats={} escapes={}",
            escape_log(&name),
            resolution,
            counters.victories,
            counters.defeats,
            counters.escapes
        );
        let _ = self.updates.send(BattleUpdate::Resolved(resolution));

        if let Some(reward) = self.engine.take_reward() {
            let api = Arc::clone(&self.api);
            let result = self
                .session
                .guard(|cred| async move { api.award_reward(&cred, reward).await })
                .await;
            let update = match result {
                Ok(Some(profile)) => BattleUpdate::RewardGranted { reward, profile },
                Ok(None) => BattleUpdate::RewardFailed("not logged in; reward not saved".to_string()),
                Err(e) => {
                    warn!(target: LOG_TARGET, "reward delivery failed: {}", e);
                    BattleUpdate::RewardFailed(e.to_string())
                }
            };
            let _ = self.updates.send(update);
        }
        self.ambient_due = Some(Instant::now() + self.timing.display_for(resolution));
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BattleCommand>) {
        self.flush();
        loop {
            let opponent_due = self.opponent_due;
            let ambient_due = self.ambient_due;
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        None => break,
                        Some(BattleCommand::Act(action, reply)) => {
                            let outcome = match action {
                                PlayerAction::Attack => self.engine.attack(&mut self.rng),
                                PlayerAction::Defend => self.engine.defend(),
                                PlayerAction::Flee => self.engine.flee(&mut self.rng),
                            };
                            let _ = reply.send(outcome);
                            self.apply(outcome).await;
                        }
                        Some(BattleCommand::View(reply)) => {
                            let _ = reply.send(self.engine.view());
                        }
                        Some(BattleCommand::Abort(done)) => {
                            let _ = done.send(());
                            break;
                        }
                    }
                }
                _ = time::sleep_until(opponent_due.unwrap_or_else(Instant::now)), if opponent_due.is_some() => {
                    self.opponent_due = None;
                    let outcome = self.engine.opponent_turn(&mut self.rng);
                    self.apply(outcome).await;
                }
                _ = time::sleep_until(ambient_due.unwrap_or_else(Instant::now)), if ambient_due.is_some() => {
                    let _ = self.updates.send(BattleUpdate::ReturnToAmbient);
                    break;
                }
            }
        }
    }
}

/// Start an encounter against `opponent` and drive it in a background task.
///
/// The opponent answers each player action after `timing.opponent_delay`.
/// Once resolved, a victory reward is delivered through `api` and
/// [`BattleUpdate::ReturnToAmbient`] follows after the display delay.
#[allow(clippy::too_many_arguments)]
pub fn start_battle<A, R>(
    mut engine: BattleEngine,
    player: PlayerVitals,
    opponent: OpponentSpec,
    rng: R,
    timing: BattleTiming,
    api: Arc<A>,
    session: Arc<SessionContext>,
    updates: mpsc::UnboundedSender<BattleUpdate>,
) -> Result<BattleHandle, ClientError>
where
    A: GameApi,
    R: Rng + Send + 'static,
{
    let name = opponent.name.clone();
    engine.start(player, opponent)?;
    let counters = metrics::record_battle_start(&name);
    info!(
        target: LOG_TARGET,
        "battle.start opponent={} hp={} started={}",
        escape_log(&name),
        player.hp,
        counters.started
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let task = BattleTask {
        engine,
        rng,
        timing,
        api,
        session,
        updates,
        log_cursor: 0,
        opponent_due: None,
        ambient_due: None,
    };
    tokio::spawn(task.run(rx));
    Ok(BattleHandle { tx })
}
