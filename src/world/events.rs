use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredKind {
    Battle,
    Treasure,
    #[serde(other)]
    Other,
}

/// An event the backend reports as currently triggerable for the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredEvent {
    pub event_id: i64,
    pub name: String,
    #[serde(rename = "event_type")]
    pub kind: TriggeredKind,
    /// Free-text description of what happens.
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub priority: i64,
}

impl TriggeredEvent {
    pub fn plan(&self) -> Plan {
        match self.kind {
            TriggeredKind::Battle => Plan::Battle(self.event_id),
            TriggeredKind::Treasure | TriggeredKind::Other => Plan::Trigger(self.event_id),
        }
    }
}

/// Pick one available event uniformly at random.
pub fn pick_event<'a, R: Rng + ?Sized>(
    events: &'a [TriggeredEvent],
    rng: &mut R,
) -> Option<&'a TriggeredEvent> {
    events.choose(rng)
}
