//! # Turn-based battle engine
//!
//! One [`BattleEngine`] drives one encounter through
//!
//! ```text
//! Idle ──start──▶ InBattle(Player) ⇄ InBattle(Opponent) ──▶ Resolved(Victory | Defeat | Escaped)
//! ```
//!
//! The engine is synchronous and owns no timers: [`runner`] wraps it in a task
//! that paces the opponent's counter-action and the return to the ambient view.
//!
//! Rules:
//! - hits deal `floor(attack × U)` with `U` uniform in `[0.8, 1.2]`;
//! - defending halves exactly one incoming hit and is then consumed;
//! - fleeing succeeds with a fixed probability, a failed attempt costs the turn;
//! - actions outside their legal state are no-ops returning [`ActionOutcome::Rejected`].
//!
//! Outcomes are computed on the client and are not validated by the server.

pub mod runner;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

pub use runner::{start_battle, BattleHandle, BattleTiming, BattleUpdate};

/// Lower and upper bound of the damage variance factor.
pub const DAMAGE_VARIANCE: (f64, f64) = (0.8, 1.2);
pub const DEFAULT_FLEE_CHANCE: f64 = 0.7;

/// Player stats snapshotted when an encounter starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerVitals {
    pub hp: u32,
    pub max_hp: u32,
    pub mp: u32,
    pub max_mp: u32,
    pub attack: u32,
    pub defense: u32,
}

impl Default for PlayerVitals {
    fn default() -> Self {
        Self {
            hp: 100,
            max_hp: 100,
            mp: 50,
            max_mp: 50,
            attack: 10,
            defense: 5,
        }
    }
}

impl PlayerVitals {
    /// Clamp current values into `[0, max]`.
    pub fn clamped(mut self) -> Self {
        self.hp = self.hp.min(self.max_hp);
        self.mp = self.mp.min(self.max_mp);
        self
    }
}

/// Opponent definition as delivered by an event or built-in encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentSpec {
    pub name: String,
    #[serde(default = "default_avatar")]
    pub avatar: String,
    pub hp: u32,
    #[serde(rename = "maxHp", alias = "max_hp")]
    pub max_hp: u32,
    pub attack: u32,
    #[serde(default)]
    pub defense: u32,
    #[serde(default = "default_exp")]
    pub exp: u32,
    #[serde(default)]
    pub gold: u32,
}

fn default_avatar() -> String {
    "👹".to_string()
}

fn default_exp() -> u32 {
    10
}

impl OpponentSpec {
    /// The forest goblin met when engaging without a backend event.
    pub fn forest_goblin() -> Self {
        Self {
            name: "Forest Goblin".to_string(),
            avatar: default_avatar(),
            hp: 30,
            max_hp: 30,
            attack: 8,
            defense: 3,
            exp: 15,
            gold: 5,
        }
    }

    /// A stationary target for practising; hits back weakly.
    pub fn training_dummy() -> Self {
        Self {
            name: "Training Dummy".to_string(),
            avatar: "🎯".to_string(),
            hp: 50,
            max_hp: 50,
            attack: 1,
            defense: 0,
            exp: 1,
            gold: 0,
        }
    }

    pub fn reward(&self) -> Reward {
        Reward {
            exp: self.exp,
            gold: self.gold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub exp: u32,
    pub gold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Player,
    Opponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Victory,
    Defeat,
    Escaped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattlePhase {
    Idle,
    InBattle(Turn),
    Resolved(Resolution),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Attack,
    Defend,
    Flee,
}

impl PlayerAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attack" | "a" | "hit" => Some(PlayerAction::Attack),
            "defend" | "d" | "guard" => Some(PlayerAction::Defend),
            "flee" | "f" | "run" => Some(PlayerAction::Flee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Not legal in the current phase; nothing changed.
    Rejected,
    /// Turn passed to the opponent; its action is due.
    OpponentTurn,
    /// Turn returned to the player.
    PlayerTurn,
    Resolved(Resolution),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTone {
    Info,
    Damage,
    Heal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleLogLine {
    pub tone: LogTone,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpponentState {
    pub spec: OpponentSpec,
    pub hp: u32,
}

/// Read-only copy of the engine for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct BattleView {
    pub phase: BattlePhase,
    pub player: PlayerVitals,
    pub opponent: Option<OpponentState>,
    pub defending: bool,
}

/// `floor(attack × U)`, `U ~ Uniform[0.8, 1.2]`.
pub fn roll_damage<R: Rng + ?Sized>(attack: u32, rng: &mut R) -> u32 {
    let factor: f64 = rng.gen_range(DAMAGE_VARIANCE.0..=DAMAGE_VARIANCE.1);
    (attack as f64 * factor).floor() as u32
}

#[derive(Debug, Clone)]
pub struct BattleEngine {
    phase: BattlePhase,
    player: PlayerVitals,
    opponent: Option<OpponentState>,
    defending: bool,
    flee_chance: f64,
    reward_claimed: bool,
    log: Vec<BattleLogLine>,
}

impl Default for BattleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FLEE_CHANCE)
    }
}

impl BattleEngine {
    pub fn new(flee_chance: f64) -> Self {
        Self {
            phase: BattlePhase::Idle,
            player: PlayerVitals::default(),
            opponent: None,
            defending: false,
            flee_chance: flee_chance.clamp(0.0, 1.0),
            reward_claimed: false,
            log: Vec::new(),
        }
    }

    /// Begin an encounter. The player's vitals are copied as the fixed baseline
    /// for this battle; later profile changes do not reach it.
    pub fn start(&mut self, player: PlayerVitals, opponent: OpponentSpec) -> Result<(), ClientError> {
        if self.is_active() {
            return Err(ClientError::BattleActive);
        }
        let mut spec = opponent;
        spec.max_hp = spec.max_hp.max(1);
        let hp = spec.hp.min(spec.max_hp);
        self.player = player.clamped();
        self.defending = false;
        self.reward_claimed = false;
        self.log.clear();
        self.push(LogTone::Info, format!("You encounter {}!", spec.name));
        self.push(LogTone::Info, "The battle begins!".to_string());
        self.opponent = Some(OpponentState { spec, hp });
        self.phase = BattlePhase::InBattle(Turn::Player);
        Ok(())
    }

    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, BattlePhase::InBattle(_))
    }

    pub fn is_player_turn(&self) -> bool {
        self.phase == BattlePhase::InBattle(Turn::Player)
    }

    pub fn player(&self) -> &PlayerVitals {
        &self.player
    }

    pub fn opponent(&self) -> Option<&OpponentState> {
        self.opponent.as_ref()
    }

    pub fn is_defending(&self) -> bool {
        self.defending
    }

    pub fn log(&self) -> &[BattleLogLine] {
        &self.log
    }

    pub fn view(&self) -> BattleView {
        BattleView {
            phase: self.phase,
            player: self.player,
            opponent: self.opponent.clone(),
            defending: self.defending,
        }
    }

    pub fn attack<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ActionOutcome {
        if !self.is_player_turn() {
            return ActionOutcome::Rejected;
        }
        let damage = roll_damage(self.player.attack, rng);
        let (name, remaining) = match self.opponent.as_mut() {
            Some(op) => {
                op.hp = op.hp.saturating_sub(damage);
                (op.spec.name.clone(), op.hp)
            }
            None => return ActionOutcome::Rejected,
        };
        self.push(LogTone::Damage, format!("You hit {} for {} damage!", name, damage));
        if remaining == 0 {
            return self.resolve(Resolution::Victory);
        }
        self.phase = BattlePhase::InBattle(Turn::Opponent);
        ActionOutcome::OpponentTurn
    }

    pub fn defend(&mut self) -> ActionOutcome {
        if !self.is_player_turn() {
            return ActionOutcome::Rejected;
        }
        self.defending = true;
        self.push(LogTone::Info, "You take a defensive stance!".to_string());
        self.phase = BattlePhase::InBattle(Turn::Opponent);
        ActionOutcome::OpponentTurn
    }

    pub fn flee<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ActionOutcome {
        if !self.is_player_turn() {
            return ActionOutcome::Rejected;
        }
        let roll: f64 = rng.gen();
        if roll < self.flee_chance {
            self.push(LogTone::Info, "You got away safely!".to_string());
            return self.resolve(Resolution::Escaped);
        }
        self.push(LogTone::Info, "You failed to escape!".to_string());
        self.phase = BattlePhase::InBattle(Turn::Opponent);
        ActionOutcome::OpponentTurn
    }

    /// The opponent's automatic counter-action. Only the battle runner calls
    /// this, once the opponent's thinking delay has elapsed.
    pub(crate) fn opponent_turn<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ActionOutcome {
        if self.phase != BattlePhase::InBattle(Turn::Opponent) {
            return ActionOutcome::Rejected;
        }
        let (name, attack) = match self.opponent.as_ref() {
            Some(op) => (op.spec.name.clone(), op.spec.attack),
            None => return ActionOutcome::Rejected,
        };
        let mut damage = roll_damage(attack, rng);
        if self.defending {
            damage /= 2;
            self.defending = false;
            self.push(
                LogTone::Info,
                format!("{} attacks, but your guard softens the blow!", name),
            );
        } else {
            self.push(LogTone::Info, format!("{} attacks you!", name));
        }
        self.player.hp = self.player.hp.saturating_sub(damage);
        self.push(LogTone::Damage, format!("You take {} damage!", damage));
        if self.player.hp == 0 {
            return self.resolve(Resolution::Defeat);
        }
        self.phase = BattlePhase::InBattle(Turn::Player);
        ActionOutcome::PlayerTurn
    }

    /// The victory reward, handed out at most once per encounter.
    pub fn take_reward(&mut self) -> Option<Reward> {
        if self.phase != BattlePhase::Resolved(Resolution::Victory) || self.reward_claimed {
            return None;
        }
        self.reward_claimed = true;
        self.opponent.as_ref().map(|op| op.spec.reward())
    }

    fn resolve(&mut self, resolution: Resolution) -> ActionOutcome {
        self.phase = BattlePhase::Resolved(resolution);
        self.defending = false;
        let name = self
            .opponent
            .as_ref()
            .map(|op| op.spec.name.clone())
            .unwrap_or_default();
        match resolution {
            Resolution::Victory => {
                let exp = self.opponent.as_ref().map(|op| op.spec.exp).unwrap_or(0);
                self.push(LogTone::Heal, format!("You defeated {}!", name));
                self.push(LogTone::Heal, format!("Gained {} experience!", exp));
            }
            Resolution::Defeat => {
                self.push(LogTone::Damage, "You have been defeated...".to_string());
            }
            Resolution::Escaped => {}
        }
        ActionOutcome::Resolved(resolution)
    }

    fn push(&mut self, tone: LogTone, text: String) {
        self.log.push(BattleLogLine { tone, text });
    }
}
