use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::choice::ChoiceKey;
use super::event::{EventKind, EventSubmission, NarratorPrompt, BROADCAST_TARGET};
use super::sync::SyncHandle;
use crate::api::GameApi;
use crate::errors::ClientError;
use crate::logutil::escape_log;
use crate::session::SessionContext;

/// Turns local actions into outbound room events.
///
/// After a successful submission the dispatcher forces one sync cycle so the
/// sender sees their own event, asks the narrator to respond, and schedules
/// one more cycle after `followup_delay` to pick up the reply. It never
/// touches the log directly; choice sets are claimed through the
/// synchronizer handle.
pub struct InteractionDispatcher<A: GameApi> {
    api: Arc<A>,
    session: Arc<SessionContext>,
    room_id: String,
    sync: SyncHandle,
    followup_delay: Duration,
}

impl<A: GameApi> InteractionDispatcher<A> {
    pub fn new(
        api: Arc<A>,
        session: Arc<SessionContext>,
        room_id: impl Into<String>,
        sync: SyncHandle,
        followup_delay: Duration,
    ) -> Self {
        Self {
            api,
            session,
            room_id: room_id.into(),
            sync,
            followup_delay,
        }
    }

    fn identity(&self) -> Result<String, ClientError> {
        self.session.identity().ok_or(ClientError::NotAuthenticated)
    }

    async fn submit(&self, submission: EventSubmission) -> Result<(), ClientError> {
        let api = Arc::clone(&self.api);
        let sub = &submission;
        match self
            .session
            .guard(|cred| async move { api.submit_room_event(&cred, sub).await })
            .await
        {
            Ok(Some(())) => Ok(()),
            Ok(None) => Err(ClientError::SessionExpired),
            Err(e) => Err(e.into()),
        }
    }

    /// Provoke failures are logged only; the submitted event already stands.
    async fn provoke(&self, prompt: NarratorPrompt) {
        let api = Arc::clone(&self.api);
        let p = &prompt;
        match self
            .session
            .guard(|cred| async move { api.provoke_narrator_response(&cred, p).await })
            .await
        {
            Ok(Some(())) => debug!(
                "narrator prompted room={} target={}",
                escape_log(&prompt.room_id),
                escape_log(&prompt.target)
            ),
            Ok(None) => debug!("narrator prompt skipped: session gone"),
            Err(e) => warn!(
                "narrator prompt failed room={}: {}",
                escape_log(&prompt.room_id),
                e
            ),
        }
    }

    /// Send an interaction aimed at `target` and ask the narrator to respond.
    pub async fn send_interaction(&self, target: &str, content: &str) -> Result<(), ClientError> {
        let target = target.trim();
        let content = content.trim();
        if target.is_empty() {
            return Err(ClientError::validation("choose who the interaction is for"));
        }
        if content.is_empty() {
            return Err(ClientError::validation("interaction text is empty"));
        }
        let identity = self.identity()?;

        self.submit(EventSubmission {
            room_id: self.room_id.clone(),
            content: content.to_string(),
            kind: EventKind::Interaction,
            target: Some(target.to_string()),
        })
        .await?;
        info!(
            "interaction room={} from={} to={} text={}",
            escape_log(&self.room_id),
            escape_log(&identity),
            escape_log(target),
            escape_log(content)
        );

        self.sync.sync_now().await;
        self.provoke(NarratorPrompt {
            room_id: self.room_id.clone(),
            prompt: interaction_prompt(&identity, target, content),
            original_sender: identity,
            target: target.to_string(),
        })
        .await;
        self.sync.sync_after(self.followup_delay);
        Ok(())
    }

    /// Plain chat line, optionally directed at one participant.
    pub async fn say(&self, content: &str, target: Option<&str>) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::validation("message is empty"));
        }
        self.identity()?;
        let target = target.map(str::trim).filter(|t| !t.is_empty());
        self.submit(EventSubmission {
            room_id: self.room_id.clone(),
            content: content.to_string(),
            kind: EventKind::Chat,
            target: target.map(str::to_string),
        })
        .await?;
        self.sync.sync_now().await;
        Ok(())
    }

    /// Pick option `key` of the choice set attached to `event_id`.
    ///
    /// The set is disabled before anything is sent. If the submission fails
    /// the set is re-opened so the choice can be retried.
    pub async fn select_choice(&self, event_id: &str, key: ChoiceKey) -> Result<String, ClientError> {
        let identity = self.identity()?;
        let option = self
            .sync
            .claim_choice(event_id, key)
            .await
            .ok_or_else(|| ClientError::validation(format!("choice {} is not available", key)))?;
        let phrase = option.canonical_phrase();

        if let Err(e) = self
            .submit(EventSubmission {
                room_id: self.room_id.clone(),
                content: phrase.clone(),
                kind: EventKind::Chat,
                target: None,
            })
            .await
        {
            self.sync.release_choice(event_id);
            return Err(e);
        }
        info!(
            "choice room={} user={} event={} key={}",
            escape_log(&self.room_id),
            escape_log(&identity),
            escape_log(event_id),
            key
        );

        self.sync.sync_now().await;
        self.provoke(NarratorPrompt {
            room_id: self.room_id.clone(),
            prompt: choice_prompt(&identity, &phrase),
            original_sender: identity,
            target: BROADCAST_TARGET.to_string(),
        })
        .await;
        self.sync.sync_after(self.followup_delay);
        Ok(phrase)
    }
}

/// Narrator text for a directed interaction.
pub fn interaction_prompt(sender: &str, target: &str, content: &str) -> String {
    format!("{} says to {}: {}", sender, target, content)
}

/// Narrator text for an answered choice. Keeps the canonical phrase verbatim
/// and asks for the player's real name instead of a placeholder.
pub fn choice_prompt(player: &str, phrase: &str) -> String {
    format!(
        "{player} made a choice: {phrase}. As the narrator, describe the outcome of this action \
         and what happens next, addressing the player as \"{player}\" rather than a placeholder.",
        player = player,
        phrase = phrase
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_prompt_names_both_sides() {
        assert_eq!(interaction_prompt("alice", "bob", "bows"), "alice says to bob: bows");
    }

    #[test]
    fn choice_prompt_keeps_phrase_and_player() {
        let text = choice_prompt("alice", "I choose B: Climb down");
        assert!(text.starts_with("alice made a choice: I choose B: Climb down."));
        assert!(text.contains("\"alice\""));
    }
}
