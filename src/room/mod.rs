//! # Shared rooms
//!
//! A room is a server-side log of events shared by its participants. The
//! client keeps a read-through copy:
//!
//! - [`sync`] polls the backend on an interval and merges new events behind a
//!   timestamp watermark, so overlapping poll windows never duplicate entries
//! - [`choice`] turns narrator prompts addressed to this client into one-shot
//!   option sets
//! - [`dispatch`] sends interactions, chat and choice selections, then pulls
//!   the narrator's reply in through forced sync cycles
//!
//! Data flow: synchronizer → choice extractor → dispatcher (on selection) →
//! backend → next sync cycle.

pub mod choice;
pub mod dispatch;
pub mod event;
pub mod sync;

pub use choice::{ChoiceKey, ChoiceOption, ChoiceSet};
pub use dispatch::InteractionDispatcher;
pub use event::{
    EventKind, EventSubmission, NarratorPrompt, Participant, PollBatch, RoomEvent, RoomSummary,
    BROADCAST_TARGET,
};
pub use sync::{start_sync, LogEntry, SyncHandle, SyncSnapshot, SyncState, SyncUpdate};
