//! Room message synchronizer.
//!
//! [`SyncState`] is the pure merge logic: watermark, duplicate suppression,
//! choice extraction and roster diffing. [`start_sync`] runs it inside a
//! single task that owns the state, so poll cycles never overlap and every
//! other component reads the log only through snapshots.

use log::{debug, error, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::choice::{self, ChoiceKey, ChoiceOption, ChoiceSet};
use super::event::{PollBatch, RoomEvent};
use crate::api::GameApi;
use crate::logutil::escape_log;
use crate::metrics;
use crate::session::SessionContext;

const LOG_TARGET: &str = "questroom::sync";

/// One accepted event with the choices it offers this client, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub event: RoomEvent,
    pub choices: Option<ChoiceSet>,
}

/// Participants this client can address, excluding itself.
#[derive(Debug, Clone, Default)]
pub struct AddresseeList {
    targets: Arc<Vec<String>>,
    selected: Option<String>,
}

impl AddresseeList {
    pub fn targets(&self) -> &Arc<Vec<String>> {
        &self.targets
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn rebuild(&mut self, roster: &[String], identity: &str) {
        let targets: Vec<String> = roster.iter().filter(|p| *p != identity).cloned().collect();
        if let Some(sel) = &self.selected {
            if !targets.contains(sel) {
                self.selected = None;
            }
        }
        self.targets = Arc::new(targets);
    }

    /// Select a participant by case-insensitive name, or clear with `None`.
    pub fn select(&mut self, who: Option<&str>) -> bool {
        match who {
            None => {
                self.selected = None;
                true
            }
            Some(name) => {
                let wanted = name.trim().to_lowercase();
                match self.targets.iter().find(|t| t.to_lowercase() == wanted) {
                    Some(found) => {
                        self.selected = Some(found.clone());
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

/// What one [`SyncState::merge`] changed.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub accepted: Vec<LogEntry>,
    pub suppressed: usize,
    pub roster_changed: bool,
}

#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub last_seen: f64,
    pub log: Vec<LogEntry>,
    pub roster: Vec<String>,
    pub addressees: Arc<Vec<String>>,
    pub selected: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncState {
    identity: String,
    narrator: String,
    log: Vec<LogEntry>,
    seen_ids: HashSet<String>,
    last_seen: f64,
    roster: Vec<String>,
    addressees: AddresseeList,
}

impl SyncState {
    pub fn new(identity: impl Into<String>, narrator: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            narrator: narrator.into(),
            log: Vec::new(),
            seen_ids: HashSet::new(),
            last_seen: 0.0,
            roster: Vec::new(),
            addressees: AddresseeList::default(),
        }
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn addressees(&self) -> &AddresseeList {
        &self.addressees
    }

    pub fn select_addressee(&mut self, who: Option<&str>) -> bool {
        self.addressees.select(who)
    }

    /// Fold one poll result into the log.
    ///
    /// Events at or below the pre-batch watermark, events already in the log
    /// and events with a non-finite timestamp are dropped. Survivors are
    /// appended in ascending timestamp order; equal timestamps keep transport
    /// order.
    pub fn merge(&mut self, batch: PollBatch) -> MergeOutcome {
        let floor = self.last_seen;
        let mut outcome = MergeOutcome::default();
        let mut fresh: Vec<RoomEvent> = Vec::with_capacity(batch.events.len());
        for ev in batch.events {
            if !ev.timestamp.is_finite() || ev.timestamp <= floor || !self.seen_ids.insert(ev.id.clone()) {
                outcome.suppressed += 1;
                continue;
            }
            fresh.push(ev);
        }
        fresh.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        for ev in fresh {
            if ev.timestamp > self.last_seen {
                self.last_seen = ev.timestamp;
            }
            let choices = choice::extract(&ev, &self.narrator, &self.identity);
            let entry = LogEntry { event: ev, choices };
            self.log.push(entry.clone());
            outcome.accepted.push(entry);
        }

        let mut roster: Vec<String> = batch.participants.into_iter().map(|p| p.identity).collect();
        roster.sort();
        roster.dedup();
        if roster != self.roster {
            self.addressees.rebuild(&roster, &self.identity);
            self.roster = roster;
            outcome.roster_changed = true;
        }
        outcome
    }

    fn entry_mut(&mut self, event_id: &str) -> Option<&mut LogEntry> {
        self.log.iter_mut().rev().find(|e| e.event.id == event_id)
    }

    /// Disable the choice set on `event_id` and return the picked option.
    pub fn claim_choice(&mut self, event_id: &str, key: ChoiceKey) -> Option<ChoiceOption> {
        self.entry_mut(event_id)?.choices.as_mut()?.claim(key)
    }

    pub fn release_choice(&mut self, event_id: &str) {
        if let Some(set) = self.entry_mut(event_id).and_then(|e| e.choices.as_mut()) {
            set.release();
        }
    }

    /// Newest choice set still waiting for a selection.
    pub fn latest_open_choice(&self) -> Option<(&str, &ChoiceSet)> {
        self.log.iter().rev().find_map(|e| match &e.choices {
            Some(set) if set.is_open() => Some((e.event.id.as_str(), set)),
            _ => None,
        })
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            last_seen: self.last_seen,
            log: self.log.clone(),
            roster: self.roster.clone(),
            addressees: Arc::clone(self.addressees.targets()),
            selected: self.addressees.selected.clone(),
        }
    }
}

/// Pushed to the front end as the log changes.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    Events(Vec<LogEntry>),
    Participants(Arc<Vec<String>>),
    /// A cycle failed; the next one will retry from the same watermark.
    Failed(String),
}

pub enum SyncCommand {
    SyncNow(Option<oneshot::Sender<()>>),
    SyncAfter(Duration),
    Snapshot(oneshot::Sender<SyncSnapshot>),
    SelectAddressee(Option<String>, oneshot::Sender<bool>),
    ClaimChoice {
        event_id: String,
        key: ChoiceKey,
        reply: oneshot::Sender<Option<ChoiceOption>>,
    },
    ReleaseChoice(String),
    LatestOpenChoice(oneshot::Sender<Option<String>>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    /// Run one cycle now and wait for it. `false` when the synchronizer has stopped.
    pub async fn sync_now(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SyncCommand::SyncNow(Some(tx))).is_err() {
            return false;
        }
        rx.await.is_ok()
    }

    /// Schedule one extra cycle after `delay`. Dropped if the room is left first.
    pub fn sync_after(&self, delay: Duration) {
        let _ = self.tx.send(SyncCommand::SyncAfter(delay));
    }

    pub async fn snapshot(&self) -> Option<SyncSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SyncCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn select_addressee(&self, who: Option<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SyncCommand::SelectAddressee(who, tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn claim_choice(&self, event_id: &str, key: ChoiceKey) -> Option<ChoiceOption> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(SyncCommand::ClaimChoice {
                event_id: event_id.to_string(),
                key,
                reply: tx,
            })
            .ok()?;
        rx.await.ok().flatten()
    }

    pub fn release_choice(&self, event_id: &str) {
        let _ = self.tx.send(SyncCommand::ReleaseChoice(event_id.to_string()));
    }

    /// Id of the newest event whose choice set is still open.
    pub async fn latest_open_choice(&self) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(SyncCommand::LatestOpenChoice(tx)).ok()?;
        rx.await.ok().flatten()
    }

    /// Request a stop without waiting for it. A cycle already running
    /// finishes; nothing starts after it.
    pub fn stop(&self) {
        let (tx, _) = oneshot::channel();
        let _ = self.tx.send(SyncCommand::Shutdown(tx));
    }

    /// Stop polling. Once this returns no further cycle runs for this room.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(SyncCommand::Shutdown(tx));
        let _ = rx.await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn run_cycle<A: GameApi>(
    api: &A,
    session: &SessionContext,
    room_id: &str,
    state: &mut SyncState,
    updates: &mpsc::UnboundedSender<SyncUpdate>,
) {
    let since = state.last_seen();
    let started = std::time::Instant::now();
    let result = session
        .guard(|cred| async move { api.poll_room(&cred, room_id, since).await })
        .await;
    metrics::observe_poll_latency(started);
    match result {
        Ok(Some(batch)) => {
            metrics::inc_sync_ok();
            let outcome = state.merge(batch);
            metrics::add_events_accepted(outcome.accepted.len());
            metrics::add_events_suppressed(outcome.suppressed);
            debug!(
                target: LOG_TARGET,
                "sync room={} accepted={} suppressed={} last_seen={:.3} roster_changed={}",
                escape_log(room_id),
                outcome.accepted.len(),
                outcome.suppressed,
                state.last_seen(),
                outcome.roster_changed
            );
            if !outcome.accepted.is_empty() {
                let _ = updates.send(SyncUpdate::Events(outcome.accepted));
            }
            if outcome.roster_changed {
                metrics::inc_roster_rebuilds();
                let _ = updates.send(SyncUpdate::Participants(Arc::clone(
                    state.addressees().targets(),
                )));
            }
        }
        Ok(None) => {
            debug!(target: LOG_TARGET, "sync room={} skipped: no session", escape_log(room_id));
        }
        Err(e) => {
            metrics::inc_sync_failed();
            if e.is_transient() {
                warn!(target: LOG_TARGET, "sync room={} failed: {}", escape_log(room_id), e);
            } else {
                error!(target: LOG_TARGET, "sync room={} rejected: {}", escape_log(room_id), e);
            }
            let _ = updates.send(SyncUpdate::Failed(e.to_string()));
        }
    }
}

/// Start polling `room_id` every `poll_interval`, beginning immediately.
///
/// The returned handle is the only way to reach the state. Timer ticks,
/// forced cycles and deferred cycles all run inside this one task, so they
/// are strictly sequential.
pub fn start_sync<A: GameApi>(
    api: Arc<A>,
    session: Arc<SessionContext>,
    room_id: String,
    mut state: SyncState,
    poll_interval: Duration,
    updates: mpsc::UnboundedSender<SyncUpdate>,
) -> SyncHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<SyncCommand>();
    let handle = SyncHandle { tx };

    tokio::spawn(async move {
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Deferred cycle deadlines, ascending.
        let mut deferred: Vec<Instant> = Vec::new();
        loop {
            let next_deferred = deferred.first().copied();
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        None => break,
                        Some(SyncCommand::SyncNow(done)) => {
                            run_cycle(api.as_ref(), &session, &room_id, &mut state, &updates).await;
                            if let Some(done) = done {
                                let _ = done.send(());
                            }
                        }
                        Some(SyncCommand::SyncAfter(delay)) => {
                            let at = Instant::now() + delay;
                            let pos = deferred.partition_point(|d| *d <= at);
                            deferred.insert(pos, at);
                        }
                        Some(SyncCommand::Snapshot(resp)) => {
                            let _ = resp.send(state.snapshot());
                        }
                        Some(SyncCommand::SelectAddressee(who, resp)) => {
                            let _ = resp.send(state.select_addressee(who.as_deref()));
                        }
                        Some(SyncCommand::ClaimChoice { event_id, key, reply }) => {
                            let _ = reply.send(state.claim_choice(&event_id, key));
                        }
                        Some(SyncCommand::ReleaseChoice(event_id)) => {
                            state.release_choice(&event_id);
                        }
                        Some(SyncCommand::LatestOpenChoice(resp)) => {
                            let _ = resp.send(state.latest_open_choice().map(|(id, _)| id.to_string()));
                        }
                        Some(SyncCommand::Shutdown(done)) => {
                            let _ = done.send(());
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    run_cycle(api.as_ref(), &session, &room_id, &mut state, &updates).await;
                }
                _ = time::sleep_until(next_deferred.unwrap_or_else(Instant::now)), if next_deferred.is_some() => {
                    deferred.remove(0);
                    run_cycle(api.as_ref(), &session, &room_id, &mut state, &updates).await;
                }
            }
        }
        debug!(target: LOG_TARGET, "sync loop for room {} terminated", escape_log(&room_id));
    });

    handle
}
