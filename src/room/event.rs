use serde::{Deserialize, Deserializer, Serialize};

/// Target used when a message is addressed to the whole room.
pub const BROADCAST_TARGET: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "private", alias = "chat")]
    Chat,
    #[serde(rename = "interaction")]
    Interaction,
    #[serde(rename = "global", alias = "broadcast")]
    Broadcast,
    #[serde(rename = "system")]
    #[serde(other)]
    System,
}

impl EventKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventKind::Chat => "private",
            EventKind::Interaction => "interaction",
            EventKind::Broadcast => "global",
            EventKind::System => "system",
        }
    }
}

/// One message in a room's shared log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub id: String,
    pub sender: String,
    pub content: String,
    #[serde(rename = "message_type")]
    pub kind: EventKind,
    #[serde(rename = "target_user", default, deserialize_with = "blank_as_none")]
    pub target: Option<String>,
    pub timestamp: f64,
}

/// The backend sends `""` for untargeted messages as often as `null`.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "username")]
    pub identity: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub joined_at: f64,
}

/// Result of one poll: new events and the current participant list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    pub events: Vec<RoomEvent>,
    pub participants: Vec<Participant>,
}

/// An outbound room event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSubmission {
    pub room_id: String,
    pub content: String,
    #[serde(rename = "message_type")]
    pub kind: EventKind,
    #[serde(rename = "target_user", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Request for the narrator to answer an interaction or choice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarratorPrompt {
    pub room_id: String,
    #[serde(rename = "interaction_content")]
    pub prompt: String,
    pub original_sender: String,
    #[serde(rename = "target_user")]
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user_count: u32,
    #[serde(default)]
    pub max_users: u32,
    #[serde(default)]
    pub created_at: f64,
}
