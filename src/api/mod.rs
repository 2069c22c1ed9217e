//! # Backend API
//!
//! [`GameApi`] is the seam between the client and the game backend. Every
//! subsystem is generic over it so the room synchronizer, the dispatcher and
//! the battle runner can be driven by [`HttpApi`] in production and by a
//! scripted in-memory implementation in tests.
//!
//! All calls that take a [`Credential`] may fail with
//! [`ApiError::Unauthorized`](crate::errors::ApiError::Unauthorized); callers
//! route those through [`SessionContext::guard`](crate::session::SessionContext::guard)
//! so the session is torn down in one place.

pub mod http;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

use crate::battle::{OpponentSpec, PlayerVitals, Reward};
use crate::errors::ApiResult;
use crate::logutil::redact_token;
use crate::room::{EventSubmission, NarratorPrompt, PollBatch, RoomSummary};
use crate::world::{LocationInteraction, TriggeredEvent};

pub use http::HttpApi;

/// Opaque session token issued by the backend.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    /// Raw token for the transport layer.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", redact_token(&self.0))
    }
}

/// Player progression record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    #[serde(rename = "HP", default = "default_hp")]
    pub hp: u32,
    #[serde(rename = "MP", default = "default_mp")]
    pub mp: u32,
    #[serde(default = "default_attack")]
    pub attack: u32,
    #[serde(default = "default_defense")]
    pub defense: u32,
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub gold: u32,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_hp() -> u32 {
    100
}
fn default_mp() -> u32 {
    50
}
fn default_attack() -> u32 {
    10
}
fn default_defense() -> u32 {
    5
}
fn default_level() -> u32 {
    1
}

impl PlayerProfile {
    /// Battle vitals from this profile. Maxima come from `baseline` and never
    /// drop below the current values.
    pub fn to_vitals(&self, baseline: &PlayerVitals) -> PlayerVitals {
        PlayerVitals {
            hp: self.hp,
            max_hp: baseline.max_hp.max(self.hp),
            mp: self.mp,
            max_mp: baseline.max_mp.max(self.mp),
            attack: self.attack,
            defense: self.defense,
        }
    }

    pub fn with_reward(&self, reward: Reward) -> PlayerProfile {
        PlayerProfile {
            experience: self.experience.saturating_add(reward.exp),
            gold: self.gold.saturating_add(reward.gold),
            ..self.clone()
        }
    }
}

/// Operations the client needs from the game backend.
pub trait GameApi: Send + Sync + 'static {
    /// Exchange identity and secret for a credential.
    fn authenticate(
        &self,
        identity: &str,
        secret: &str,
    ) -> impl Future<Output = ApiResult<Credential>> + Send;

    /// `Ok(false)` when the backend no longer honours the credential.
    fn validate(&self, cred: &Credential) -> impl Future<Output = ApiResult<bool>> + Send;

    fn revoke(&self, cred: &Credential) -> impl Future<Output = ApiResult<()>> + Send;

    /// Create a room (the creator joins it) and return its id.
    fn create_room(&self, cred: &Credential) -> impl Future<Output = ApiResult<String>> + Send;

    fn join_room(
        &self,
        cred: &Credential,
        room_id: &str,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn leave_room(
        &self,
        cred: &Credential,
        room_id: &str,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn list_rooms(&self) -> impl Future<Output = ApiResult<Vec<RoomSummary>>> + Send;

    /// Events visible to the caller with a timestamp strictly after `since`,
    /// plus the current participant list.
    fn poll_room(
        &self,
        cred: &Credential,
        room_id: &str,
        since: f64,
    ) -> impl Future<Output = ApiResult<PollBatch>> + Send;

    fn submit_room_event(
        &self,
        cred: &Credential,
        submission: &EventSubmission,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// Ask the narrator to respond; the reply arrives through later polls.
    fn provoke_narrator_response(
        &self,
        cred: &Credential,
        prompt: &NarratorPrompt,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn fetch_profile(
        &self,
        cred: &Credential,
    ) -> impl Future<Output = ApiResult<PlayerProfile>> + Send;

    /// Add experience and gold to the stored profile; returns the updated profile.
    fn award_reward(
        &self,
        cred: &Credential,
        reward: Reward,
    ) -> impl Future<Output = ApiResult<PlayerProfile>> + Send;

    fn check_triggered_events(
        &self,
        cred: &Credential,
    ) -> impl Future<Output = ApiResult<Vec<TriggeredEvent>>> + Send;

    /// Fire a non-battle event; returns the backend's description of the result.
    fn trigger_event(
        &self,
        cred: &Credential,
        event_id: i64,
    ) -> impl Future<Output = ApiResult<String>> + Send;

    /// Resolve a battle event into its opponent, if it carries one.
    fn resolve_event(
        &self,
        cred: &Credential,
        event_id: i64,
    ) -> impl Future<Output = ApiResult<Option<OpponentSpec>>> + Send;

    fn location_interactions(
        &self,
        cred: &Credential,
        location: &str,
    ) -> impl Future<Output = ApiResult<Vec<LocationInteraction>>> + Send;

    /// Start a practice bout at home. `None` when the backend sends no enemy.
    fn training_battle(
        &self,
        cred: &Credential,
    ) -> impl Future<Output = ApiResult<Option<OpponentSpec>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_is_redacted() {
        let cred = Credential::new("0123456789abcdef");
        let shown = format!("{:?}", cred);
        assert!(!shown.contains("456789"));
        assert!(shown.contains("0123****"));
    }

    #[test]
    fn profile_reads_backend_casing() {
        let json = r#"{"HP":80,"MP":30,"attack":12,"defense":4,"experience":7,"gold":3,"inventory":[]}"#;
        let profile: PlayerProfile = serde_json::from_str(json).expect("parse");
        assert_eq!(profile.hp, 80);
        assert_eq!(profile.level, 1);
        let vitals = profile.to_vitals(&PlayerVitals::default());
        assert_eq!(vitals.max_hp, 100);
        assert_eq!(vitals.attack, 12);
    }

    #[test]
    fn reward_adds_to_profile() {
        let profile: PlayerProfile = serde_json::from_str("{}").expect("parse");
        let updated = profile.with_reward(Reward { exp: 15, gold: 5 });
        assert_eq!(updated.experience, 15);
        assert_eq!(updated.gold, 5);
        assert_eq!(updated.hp, profile.hp);
    }
}
