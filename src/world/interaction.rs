use serde::{Deserialize, Serialize};

use super::Plan;

/// What a location interaction does. Unknown backend types fall into
/// [`InteractionKind::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Shop,
    Fight,
    Healing,
    Repair,
    Research,
    Gathering,
    #[serde(other)]
    Default,
}

impl InteractionKind {
    pub fn icon(&self) -> &'static str {
        match self {
            InteractionKind::Shop => "🛒",
            InteractionKind::Fight => "⚔️",
            InteractionKind::Healing => "💤",
            InteractionKind::Repair => "🔨",
            InteractionKind::Research => "📚",
            InteractionKind::Gathering => "🌿",
            InteractionKind::Default => "🎯",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInteraction {
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(rename = "interaction_name")]
    pub name: String,
    #[serde(rename = "interaction_type", default = "default_kind")]
    pub kind: InteractionKind,
}

fn default_kind() -> InteractionKind {
    InteractionKind::Default
}

impl LocationInteraction {
    pub fn plan(&self) -> Plan {
        match self.kind {
            InteractionKind::Fight => match self.event_id {
                Some(id) => Plan::Battle(id),
                None => Plan::Training,
            },
            InteractionKind::Default => match self.event_id {
                Some(id) => Plan::Trigger(id),
                None => Plan::Unavailable,
            },
            kind @ (InteractionKind::Shop
            | InteractionKind::Healing
            | InteractionKind::Repair
            | InteractionKind::Research
            | InteractionKind::Gathering) => Plan::Collaborator(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(kind: InteractionKind, event_id: Option<i64>) -> LocationInteraction {
        LocationInteraction {
            event_id,
            name: "test".to_string(),
            kind,
        }
    }

    #[test]
    fn reads_location_config() {
        let json = r#"[{"event_id":4,"interaction_name":"Hunt","interaction_type":"fight"},
                       {"interaction_name":"Pray","interaction_type":"meditation"},
                       {"interaction_name":"Market","interaction_type":"shop"}]"#;
        let list: Vec<LocationInteraction> = serde_json::from_str(json).expect("parse");
        assert_eq!(list[0].kind, InteractionKind::Fight);
        assert_eq!(list[1].kind, InteractionKind::Default);
        assert_eq!(list[2].event_id, None);
    }

    #[test]
    fn plans_follow_kind() {
        assert_eq!(interaction(InteractionKind::Fight, Some(4)).plan(), Plan::Battle(4));
        assert_eq!(interaction(InteractionKind::Fight, None).plan(), Plan::Training);
        assert_eq!(interaction(InteractionKind::Default, Some(9)).plan(), Plan::Trigger(9));
        assert_eq!(interaction(InteractionKind::Default, None).plan(), Plan::Unavailable);
        assert_eq!(
            interaction(InteractionKind::Healing, Some(2)).plan(),
            Plan::Collaborator(InteractionKind::Healing)
        );
    }

    #[test]
    fn every_kind_has_an_icon() {
        for kind in [
            InteractionKind::Shop,
            InteractionKind::Fight,
            InteractionKind::Healing,
            InteractionKind::Repair,
            InteractionKind::Research,
            InteractionKind::Gathering,
            InteractionKind::Default,
        ] {
            assert!(!kind.icon().is_empty());
        }
    }
}
