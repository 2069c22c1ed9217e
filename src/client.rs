//! # Game client
//!
//! [`GameClient`] is the single owner of application state: the session, the
//! current room (synchronizer + dispatcher) and the current battle. Front ends
//! call its methods for actions and drain [`GameClient::next_event`] for
//! everything that happens in the background.
//!
//! Each subsystem receives only what it needs: the synchronizer gets the API,
//! the session and its room id; the battle runner gets the API and session for
//! reward delivery. When the session is torn down the client stops the room
//! and aborts any battle.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::api::GameApi;
use crate::battle::{
    start_battle, ActionOutcome, BattleEngine, BattleHandle, BattleTiming, BattleUpdate,
    BattleView, OpponentSpec, PlayerAction, PlayerVitals,
};
use crate::config::Config;
use crate::errors::ClientError;
use crate::logutil::escape_log;
use crate::room::{
    start_sync, ChoiceKey, InteractionDispatcher, RoomSummary, SyncHandle, SyncSnapshot,
    SyncState, SyncUpdate,
};
use crate::session::{SessionContext, SessionStore};
use crate::world::{self, pick_event, LocationInteraction, TriggeredEvent, WorldOutcome};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Room(SyncUpdate),
    Battle(BattleUpdate),
    /// New identity after login/restore, `None` after logout or teardown.
    SessionChanged(Option<String>),
}

struct RoomContext<A: GameApi> {
    room_id: String,
    sync: SyncHandle,
    dispatcher: InteractionDispatcher<A>,
    updates: mpsc::UnboundedReceiver<SyncUpdate>,
}

struct BattleContext {
    handle: BattleHandle,
    updates: mpsc::UnboundedReceiver<BattleUpdate>,
}

async fn recv_opt<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

pub struct GameClient<A: GameApi> {
    config: Config,
    api: Arc<A>,
    session: Arc<SessionContext>,
    session_rx: watch::Receiver<Option<String>>,
    room: Option<RoomContext<A>>,
    battle: Option<BattleContext>,
}

impl<A: GameApi> GameClient<A> {
    pub fn new(config: Config, api: A) -> Self {
        let store = if config.session.remember {
            Some(SessionStore::new(&config.session.file))
        } else {
            None
        };
        let session = Arc::new(SessionContext::new(store));
        Self::with_session(config, Arc::new(api), session)
    }

    pub fn with_session(config: Config, api: Arc<A>, session: Arc<SessionContext>) -> Self {
        let session_rx = session.subscribe();
        Self {
            config,
            api,
            session,
            session_rx,
            room: None,
            battle: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn identity(&self) -> Option<String> {
        self.session.identity()
    }

    pub fn current_room(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.room_id.as_str())
    }

    pub fn in_battle(&self) -> bool {
        self.battle
            .as_ref()
            .map(|b| !b.handle.is_finished())
            .unwrap_or(false)
    }

    fn require_session(&self) -> Result<(), ClientError> {
        if self.session.is_active() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    fn room(&self) -> Result<&RoomContext<A>, ClientError> {
        self.room.as_ref().ok_or(ClientError::NoRoom)
    }

    // ---- session ----

    pub async fn restore_session(&mut self) -> Result<Option<String>, ClientError> {
        self.session.restore(self.api.as_ref()).await
    }

    pub async fn login(&mut self, identity: &str, secret: &str) -> Result<String, ClientError> {
        if let Some(current) = self.session.identity() {
            return Err(ClientError::validation(format!(
                "already logged in as {}; log out first",
                current
            )));
        }
        self.session.login(self.api.as_ref(), identity, secret).await
    }

    /// Leave any room, end any battle and revoke the session. `false` when
    /// there was no session; no network call is made in that case.
    pub async fn logout(&mut self) -> bool {
        if !self.session.is_active() {
            return false;
        }
        if self.room.is_some() {
            if let Err(e) = self.leave_room().await {
                warn!("leave during logout failed: {}", e);
            }
        }
        self.abort_battle().await;
        self.session.logout(self.api.as_ref()).await
    }

    // ---- rooms ----

    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, ClientError> {
        Ok(self.api.list_rooms().await?)
    }

    pub async fn create_room(&mut self) -> Result<String, ClientError> {
        self.require_session()?;
        if let Some(room) = &self.room {
            return Err(ClientError::AlreadyInRoom(room.room_id.clone()));
        }
        let api = Arc::clone(&self.api);
        let room_id = self
            .session
            .guard(|cred| async move { api.create_room(&cred).await })
            .await?
            .ok_or(ClientError::SessionExpired)?;
        self.enter_room(&room_id)?;
        Ok(room_id)
    }

    pub async fn join_room(&mut self, room_id: &str) -> Result<(), ClientError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(ClientError::validation("room id is empty"));
        }
        self.require_session()?;
        if let Some(room) = &self.room {
            return Err(ClientError::AlreadyInRoom(room.room_id.clone()));
        }
        let api = Arc::clone(&self.api);
        self.session
            .guard(|cred| async move { api.join_room(&cred, room_id).await })
            .await?
            .ok_or(ClientError::SessionExpired)?;
        self.enter_room(room_id)
    }

    fn enter_room(&mut self, room_id: &str) -> Result<(), ClientError> {
        let identity = self.session.identity().ok_or(ClientError::NotAuthenticated)?;
        let state = SyncState::new(identity, self.config.room.narrator_name.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = start_sync(
            Arc::clone(&self.api),
            Arc::clone(&self.session),
            room_id.to_string(),
            state,
            self.config.room.poll_interval(),
            tx,
        );
        let dispatcher = InteractionDispatcher::new(
            Arc::clone(&self.api),
            Arc::clone(&self.session),
            room_id,
            sync.clone(),
            self.config.room.narrator_followup_delay(),
        );
        info!("entered room {}", escape_log(room_id));
        self.room = Some(RoomContext {
            room_id: room_id.to_string(),
            sync,
            dispatcher,
            updates: rx,
        });
        Ok(())
    }

    /// Stop polling first, then tell the backend. The local teardown happens
    /// even when the backend call fails.
    pub async fn leave_room(&mut self) -> Result<String, ClientError> {
        let room = self.room.take().ok_or(ClientError::NoRoom)?;
        room.sync.shutdown().await;
        let api = Arc::clone(&self.api);
        let room_id = room.room_id.clone();
        let id = room_id.as_str();
        match self
            .session
            .guard(|cred| async move { api.leave_room(&cred, id).await })
            .await
        {
            Ok(_) => info!("left room {}", escape_log(&room_id)),
            Err(e) => warn!("backend leave for room {} failed: {}", escape_log(&room_id), e),
        }
        Ok(room_id)
    }

    pub async fn room_snapshot(&self) -> Option<SyncSnapshot> {
        self.room.as_ref()?.sync.snapshot().await
    }

    pub async fn sync_now(&self) -> Result<(), ClientError> {
        self.room()?.sync.sync_now().await;
        Ok(())
    }

    pub async fn say(&self, content: &str, target: Option<&str>) -> Result<(), ClientError> {
        self.room()?.dispatcher.say(content, target).await
    }

    /// Choose the default interaction target; `None` clears it.
    pub async fn select_addressee(&self, who: Option<&str>) -> Result<(), ClientError> {
        let room = self.room()?;
        if room.sync.select_addressee(who.map(str::to_string)).await {
            Ok(())
        } else {
            Err(ClientError::validation(format!(
                "{} is not in this room",
                who.unwrap_or_default()
            )))
        }
    }

    /// Send an interaction to `target`, or to the selected addressee.
    pub async fn send_interaction(&self, target: Option<&str>, content: &str) -> Result<(), ClientError> {
        let room = self.room()?;
        let target = match target {
            Some(t) => t.to_string(),
            None => room
                .sync
                .snapshot()
                .await
                .and_then(|s| s.selected)
                .unwrap_or_default(),
        };
        room.dispatcher.send_interaction(&target, content).await
    }

    /// Answer the newest open choice addressed to this client.
    pub async fn select_choice(&self, key: ChoiceKey) -> Result<String, ClientError> {
        let room = self.room()?;
        let event_id = room
            .sync
            .latest_open_choice()
            .await
            .ok_or_else(|| ClientError::validation("no open choice"))?;
        room.dispatcher.select_choice(&event_id, key).await
    }

    // ---- world ----

    pub async fn check_events(&self) -> Result<Vec<TriggeredEvent>, ClientError> {
        self.require_session()?;
        let api = Arc::clone(&self.api);
        self.session
            .guard(|cred| async move { api.check_triggered_events(&cred).await })
            .await?
            .ok_or(ClientError::SessionExpired)
    }

    /// Pick one available event at random and engage it. Battle events start
    /// an encounter.
    pub async fn engage_random_event(&mut self) -> Result<WorldOutcome, ClientError> {
        if self.in_battle() {
            return Err(ClientError::BattleActive);
        }
        let events = self.check_events().await?;
        let picked = {
            let mut rng = StdRng::from_entropy();
            pick_event(&events, &mut rng).cloned()
        };
        let Some(event) = picked else {
            return Ok(WorldOutcome::Nothing);
        };
        let outcome = world::execute(self.api.as_ref(), &self.session, event.plan(), &event.name).await?;
        self.follow_outcome(&outcome).await?;
        Ok(outcome)
    }

    pub async fn location_interactions(&self, location: &str) -> Result<Vec<LocationInteraction>, ClientError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ClientError::validation("location is empty"));
        }
        self.require_session()?;
        let api = Arc::clone(&self.api);
        self.session
            .guard(|cred| async move { api.location_interactions(&cred, location).await })
            .await?
            .ok_or(ClientError::SessionExpired)
    }

    pub async fn interact(&mut self, interaction: &LocationInteraction) -> Result<WorldOutcome, ClientError> {
        if self.in_battle() {
            return Err(ClientError::BattleActive);
        }
        let outcome = world::execute(
            self.api.as_ref(),
            &self.session,
            interaction.plan(),
            &interaction.name,
        )
        .await?;
        self.follow_outcome(&outcome).await?;
        Ok(outcome)
    }

    async fn follow_outcome(&mut self, outcome: &WorldOutcome) -> Result<(), ClientError> {
        if let WorldOutcome::Encounter { opponent, .. } = outcome {
            self.start_encounter(opponent.clone()).await?;
        }
        Ok(())
    }

    // ---- battle ----

    /// Current vitals from the backend profile, or the configured defaults.
    pub async fn player_vitals(&self) -> PlayerVitals {
        let baseline = self.config.battle.default_player;
        let api = Arc::clone(&self.api);
        match self
            .session
            .guard(|cred| async move { api.fetch_profile(&cred).await })
            .await
        {
            Ok(Some(profile)) => profile.to_vitals(&baseline),
            Ok(None) => baseline,
            Err(e) => {
                warn!("profile unavailable, using default vitals: {}", e);
                baseline
            }
        }
    }

    pub async fn start_encounter(&mut self, opponent: OpponentSpec) -> Result<(), ClientError> {
        self.start_encounter_with(opponent, StdRng::from_entropy()).await
    }

    pub async fn start_encounter_with<R>(&mut self, opponent: OpponentSpec, rng: R) -> Result<(), ClientError>
    where
        R: Rng + Send + 'static,
    {
        if self.in_battle() {
            return Err(ClientError::BattleActive);
        }
        let player = self.player_vitals().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = start_battle(
            BattleEngine::new(self.config.battle.flee_chance),
            player,
            opponent,
            rng,
            BattleTiming::from_config(&self.config.battle),
            Arc::clone(&self.api),
            Arc::clone(&self.session),
            tx,
        )?;
        self.battle = Some(BattleContext {
            handle,
            updates: rx,
        });
        Ok(())
    }

    /// Practice bout against the backend's training dummy. Falls back to the
    /// built-in dummy when the backend sends no enemy.
    pub async fn train(&mut self) -> Result<OpponentSpec, ClientError> {
        if self.in_battle() {
            return Err(ClientError::BattleActive);
        }
        self.require_session()?;
        let api = Arc::clone(&self.api);
        let sent = self
            .session
            .guard(|cred| async move { api.training_battle(&cred).await })
            .await?
            .ok_or(ClientError::SessionExpired)?;
        let opponent = sent.unwrap_or_else(OpponentSpec::training_dummy);
        self.start_encounter(opponent.clone()).await?;
        Ok(opponent)
    }

    pub async fn battle_action(&self, action: PlayerAction) -> Result<ActionOutcome, ClientError> {
        let battle = self.battle.as_ref().ok_or(ClientError::NoBattle)?;
        Ok(battle.handle.act(action).await)
    }

    pub async fn battle_view(&self) -> Option<BattleView> {
        self.battle.as_ref()?.handle.view().await
    }

    async fn abort_battle(&mut self) {
        if let Some(battle) = self.battle.take() {
            battle.handle.abort().await;
        }
    }

    // ---- background ----

    /// Next background event. Pending forever when nothing can happen.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            let event = tokio::select! {
                update = recv_opt(self.room.as_mut().map(|r| &mut r.updates)) => match update {
                    Some(u) => ClientEvent::Room(u),
                    None => {
                        self.room = None;
                        continue;
                    }
                },
                update = recv_opt(self.battle.as_mut().map(|b| &mut b.updates)) => match update {
                    Some(u) => ClientEvent::Battle(u),
                    None => {
                        self.battle = None;
                        continue;
                    }
                },
                changed = self.session_rx.changed() => match changed {
                    Ok(()) => ClientEvent::SessionChanged(self.session_rx.borrow_and_update().clone()),
                    Err(_) => return None,
                },
            };
            match &event {
                ClientEvent::Battle(BattleUpdate::ReturnToAmbient) => {
                    self.battle = None;
                }
                // No await from here on: callers race this future in a select!.
                ClientEvent::SessionChanged(None) => {
                    if let Some(room) = self.room.take() {
                        room.sync.stop();
                    }
                    if let Some(battle) = self.battle.take() {
                        battle.handle.cancel();
                    }
                }
                _ => {}
            }
            return Some(event);
        }
    }
}
