//! # World triggers
//!
//! Things outside a room that can start an encounter or report a result:
//! backend-triggered events ([`events`]) and the interactions offered at a
//! location ([`interaction`]). Both reduce to a [`Plan`], which [`execute`]
//! carries out against the backend.

pub mod events;
pub mod interaction;

use log::debug;

use crate::api::GameApi;
use crate::battle::OpponentSpec;
use crate::errors::ClientError;
use crate::logutil::escape_log;
use crate::session::SessionContext;

pub use events::{pick_event, TriggeredEvent, TriggeredKind};
pub use interaction::{InteractionKind, LocationInteraction};

/// What engaging an event or interaction will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Resolve a battle event into an opponent.
    Battle(i64),
    /// Fight the built-in training opponent.
    Training,
    /// Fire a non-battle event.
    Trigger(i64),
    /// Handled by a collaborator outside this client (shop, inn, smithy...).
    Collaborator(InteractionKind),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorldOutcome {
    Nothing,
    Encounter {
        source: String,
        opponent: OpponentSpec,
    },
    Triggered {
        source: String,
        message: String,
    },
    Collaborator {
        kind: InteractionKind,
        source: String,
    },
}

/// Carry out `plan` on behalf of `source` (the event or interaction name).
pub async fn execute<A: GameApi>(
    api: &A,
    session: &SessionContext,
    plan: Plan,
    source: &str,
) -> Result<WorldOutcome, ClientError> {
    debug!("world plan {:?} for {}", plan, escape_log(source));
    let source = source.to_string();
    match plan {
        Plan::Battle(id) => {
            let resolved = session
                .guard(|cred| async move { api.resolve_event(&cred, id).await })
                .await?
                .ok_or(ClientError::SessionExpired)?;
            Ok(match resolved {
                Some(opponent) => WorldOutcome::Encounter { source, opponent },
                None => WorldOutcome::Triggered {
                    message: format!("{} passes without a fight.", source),
                    source,
                },
            })
        }
        Plan::Training => Ok(WorldOutcome::Encounter {
            source,
            opponent: OpponentSpec::forest_goblin(),
        }),
        Plan::Trigger(id) => {
            let message = session
                .guard(|cred| async move { api.trigger_event(&cred, id).await })
                .await?
                .ok_or(ClientError::SessionExpired)?;
            Ok(WorldOutcome::Triggered { source, message })
        }
        Plan::Collaborator(kind) => Ok(WorldOutcome::Collaborator { kind, source }),
        Plan::Unavailable => Ok(WorldOutcome::Nothing),
    }
}
