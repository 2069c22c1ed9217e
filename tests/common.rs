//! Test utilities & fixtures.
//! [`FakeApi`] is a scripted, in-memory backend that records every call.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use questroom::api::{Credential, GameApi, PlayerProfile};
use questroom::battle::{OpponentSpec, Reward};
use questroom::config::Config;
use questroom::errors::{ApiError, ApiResult};
use questroom::room::{
    EventKind, EventSubmission, NarratorPrompt, Participant, PollBatch, RoomEvent, RoomSummary,
};
use questroom::session::{Session, SessionContext};
use questroom::world::{LocationInteraction, TriggeredEvent};

pub const NARRATOR: &str = "Dungeon Master";
pub const TOKEN: &str = "token-alice-0001";

pub struct FakeState {
    pub calls: Vec<&'static str>,
    pub polls: VecDeque<ApiResult<PollBatch>>,
    pub poll_sinces: Vec<f64>,
    pub participants: Vec<String>,
    pub submissions: Vec<EventSubmission>,
    pub prompts: Vec<NarratorPrompt>,
    pub unauthorized: bool,
    pub fail_submit: bool,
    pub fail_provoke: bool,
    pub valid_tokens: HashSet<String>,
    pub profile: PlayerProfile,
    pub rewards: Vec<Reward>,
    pub events: Vec<TriggeredEvent>,
    pub opponents: HashMap<i64, OpponentSpec>,
    pub interactions: Vec<LocationInteraction>,
    pub trigger_message: String,
    pub training: Option<OpponentSpec>,
    pub fail_training: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            polls: VecDeque::new(),
            poll_sinces: Vec::new(),
            participants: vec!["alice".to_string(), "bob".to_string()],
            submissions: Vec::new(),
            prompts: Vec::new(),
            unauthorized: false,
            fail_submit: false,
            fail_provoke: false,
            valid_tokens: [TOKEN.to_string()].into_iter().collect(),
            profile: profile(100, 10),
            rewards: Vec::new(),
            events: Vec::new(),
            opponents: HashMap::new(),
            interactions: Vec::new(),
            trigger_message: "You find a small pouch of coins.".to_string(),
            training: None,
            fail_training: false,
        }
    }
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state")
    }

    pub fn script_poll(&self, batch: PollBatch) {
        self.state().polls.push_back(Ok(batch));
    }

    pub fn script_poll_error(&self, err: ApiError) {
        self.state().polls.push_back(Err(err));
    }

    pub fn count(&self, name: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == name).count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    fn record(&self, name: &'static str, cred: Option<&Credential>) -> ApiResult<MutexGuard<'_, FakeState>> {
        let mut st = self.state();
        st.calls.push(name);
        if let Some(c) = cred {
            if st.unauthorized || !st.valid_tokens.contains(c.expose()) {
                return Err(ApiError::Unauthorized("session expired".to_string()));
            }
        }
        Ok(st)
    }
}

impl GameApi for FakeApi {
    async fn authenticate(&self, identity: &str, secret: &str) -> ApiResult<Credential> {
        let _st = self.record("authenticate", None)?;
        if secret == "wrong" {
            return Err(ApiError::Domain("bad password".to_string()));
        }
        let _ = identity;
        Ok(Credential::new(TOKEN))
    }

    async fn validate(&self, cred: &Credential) -> ApiResult<bool> {
        let st = self.record("validate", None)?;
        Ok(!st.unauthorized && st.valid_tokens.contains(cred.expose()))
    }

    async fn revoke(&self, cred: &Credential) -> ApiResult<()> {
        self.record("revoke", Some(cred))?;
        Ok(())
    }

    async fn create_room(&self, cred: &Credential) -> ApiResult<String> {
        self.record("create_room", Some(cred))?;
        Ok("ROOM42".to_string())
    }

    async fn join_room(&self, cred: &Credential, room_id: &str) -> ApiResult<()> {
        self.record("join_room", Some(cred))?;
        if room_id == "missing" {
            return Err(ApiError::Domain("room does not exist or is full".to_string()));
        }
        Ok(())
    }

    async fn leave_room(&self, cred: &Credential, _room_id: &str) -> ApiResult<()> {
        self.record("leave_room", Some(cred))?;
        Ok(())
    }

    async fn list_rooms(&self) -> ApiResult<Vec<RoomSummary>> {
        self.record("list_rooms", None)?;
        Ok(vec![RoomSummary {
            room_id: "ROOM42".to_string(),
            host: "alice".to_string(),
            user_count: 2,
            max_users: 10,
            created_at: 1.0,
        }])
    }

    async fn poll_room(&self, cred: &Credential, _room_id: &str, since: f64) -> ApiResult<PollBatch> {
        let mut st = self.record("poll", Some(cred))?;
        st.poll_sinces.push(since);
        match st.polls.pop_front() {
            Some(scripted) => scripted,
            None => Ok(PollBatch {
                events: Vec::new(),
                participants: people(&st.participants.iter().map(String::as_str).collect::<Vec<_>>()),
            }),
        }
    }

    async fn submit_room_event(&self, cred: &Credential, submission: &EventSubmission) -> ApiResult<()> {
        let mut st = self.record("submit", Some(cred))?;
        if st.fail_submit {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        st.submissions.push(submission.clone());
        Ok(())
    }

    async fn provoke_narrator_response(&self, cred: &Credential, prompt: &NarratorPrompt) -> ApiResult<()> {
        let mut st = self.record("provoke", Some(cred))?;
        if st.fail_provoke {
            return Err(ApiError::Timeout(10));
        }
        st.prompts.push(prompt.clone());
        Ok(())
    }

    async fn fetch_profile(&self, cred: &Credential) -> ApiResult<PlayerProfile> {
        let st = self.record("fetch_profile", Some(cred))?;
        Ok(st.profile.clone())
    }

    async fn award_reward(&self, cred: &Credential, reward: Reward) -> ApiResult<PlayerProfile> {
        let mut st = self.record("award_reward", Some(cred))?;
        st.rewards.push(reward);
        st.profile = st.profile.with_reward(reward);
        Ok(st.profile.clone())
    }

    async fn check_triggered_events(&self, cred: &Credential) -> ApiResult<Vec<TriggeredEvent>> {
        let st = self.record("check_events", Some(cred))?;
        Ok(st.events.clone())
    }

    async fn trigger_event(&self, cred: &Credential, _event_id: i64) -> ApiResult<String> {
        let st = self.record("trigger_event", Some(cred))?;
        Ok(st.trigger_message.clone())
    }

    async fn resolve_event(&self, cred: &Credential, event_id: i64) -> ApiResult<Option<OpponentSpec>> {
        let st = self.record("resolve_event", Some(cred))?;
        Ok(st.opponents.get(&event_id).cloned())
    }

    async fn location_interactions(&self, cred: &Credential, _location: &str) -> ApiResult<Vec<LocationInteraction>> {
        let st = self.record("location_interactions", Some(cred))?;
        Ok(st.interactions.clone())
    }

    async fn training_battle(&self, cred: &Credential) -> ApiResult<Option<OpponentSpec>> {
        let st = self.record("training_battle", Some(cred))?;
        if st.fail_training {
            return Err(ApiError::Domain("training ground closed".into()));
        }
        Ok(st.training.clone())
    }
}

pub fn profile(hp: u32, attack: u32) -> PlayerProfile {
    PlayerProfile {
        hp,
        mp: 20,
        attack,
        defense: 2,
        experience: 0,
        gold: 0,
        level: 1,
    }
}

pub fn people(names: &[&str]) -> Vec<Participant> {
    names
        .iter()
        .map(|n| Participant {
            identity: n.to_string(),
            is_host: false,
            joined_at: 0.0,
        })
        .collect()
}

pub fn ev(id: &str, sender: &str, content: &str, ts: f64) -> RoomEvent {
    RoomEvent {
        id: id.to_string(),
        sender: sender.to_string(),
        content: content.to_string(),
        kind: EventKind::Chat,
        target: None,
        timestamp: ts,
    }
}

pub fn batch(events: Vec<RoomEvent>, names: &[&str]) -> PollBatch {
    PollBatch {
        events,
        participants: people(names),
    }
}

pub fn opponent(name: &str, hp: u32, attack: u32) -> OpponentSpec {
    OpponentSpec {
        name: name.to_string(),
        avatar: "👹".to_string(),
        hp,
        max_hp: hp,
        attack,
        defense: 1,
        exp: 15,
        gold: 5,
    }
}

/// Config with short delays and a poll interval long enough that only the
/// immediate first tick fires during a test.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session.remember = false;
    config.room.poll_interval_ms = 60_000;
    config.room.narrator_followup_delay_ms = 30;
    config.room.narrator_name = NARRATOR.to_string();
    config.room.system_name = "System".to_string();
    config.battle.opponent_delay_ms = 10;
    config.battle.victory_display_ms = 10;
    config.battle.defeat_display_ms = 10;
    config.battle.escape_display_ms = 10;
    config
}

/// A session context already logged in as `alice`.
pub async fn logged_in() -> Arc<SessionContext> {
    let session = Arc::new(SessionContext::new(None));
    session
        .establish(Session {
            identity: "alice".to_string(),
            credential: Credential::new(TOKEN),
        })
        .await;
    session
}

/// Receive from `rx` or panic after one second.
pub async fn recv_within<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for update")
        .expect("channel closed")
}
