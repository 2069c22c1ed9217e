//! Process-wide client counters: room sync health and battle outcomes.
//! Surfaced by `questroom status` and the `/status` REPL command.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

static SYNC_CYCLES_OK: AtomicU64 = AtomicU64::new(0);
static SYNC_CYCLES_FAILED: AtomicU64 = AtomicU64::new(0);
static EVENTS_ACCEPTED: AtomicU64 = AtomicU64::new(0);
static EVENTS_SUPPRESSED: AtomicU64 = AtomicU64::new(0);
static ROSTER_REBUILDS: AtomicU64 = AtomicU64::new(0);
static POLL_LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static POLL_LATENCY_COUNT: AtomicU64 = AtomicU64::new(0);
static SESSION_TEARDOWNS: AtomicU64 = AtomicU64::new(0);

static BATTLE_COUNTERS: OnceLock<Mutex<HashMap<String, BattleCounter>>> = OnceLock::new();

pub fn inc_sync_ok() {
    SYNC_CYCLES_OK.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sync_failed() {
    SYNC_CYCLES_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn add_events_accepted(n: usize) {
    EVENTS_ACCEPTED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn add_events_suppressed(n: usize) {
    EVENTS_SUPPRESSED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn inc_roster_rebuilds() {
    ROSTER_REBUILDS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_session_teardowns() {
    SESSION_TEARDOWNS.fetch_add(1, Ordering::Relaxed);
}
pub fn observe_poll_latency(started: Instant) {
    let ms = started.elapsed().as_millis() as u64;
    POLL_LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);
    POLL_LATENCY_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Outcome tallies for one opponent name.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BattleCounter {
    pub started: u64,
    pub victories: u64,
    pub defeats: u64,
    pub escapes: u64,
}

fn battle_counter_lock() -> &'static Mutex<HashMap<String, BattleCounter>> {
    BATTLE_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn record_battle_start(opponent: &str) -> BattleCounter {
    let mut guard = match battle_counter_lock().lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let counter = guard.entry(opponent.to_string()).or_default();
    counter.started = counter.started.saturating_add(1);
    *counter
}

pub fn record_battle_end(opponent: &str, outcome: crate::battle::Resolution) -> BattleCounter {
    use crate::battle::Resolution;
    let mut guard = match battle_counter_lock().lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let counter = guard.entry(opponent.to_string()).or_default();
    match outcome {
        Resolution::Victory => counter.victories = counter.victories.saturating_add(1),
        Resolution::Defeat => counter.defeats = counter.defeats.saturating_add(1),
        Resolution::Escaped => counter.escapes = counter.escapes.saturating_add(1),
    }
    *counter
}

pub fn battle_counters_snapshot() -> HashMap<String, BattleCounter> {
    match battle_counter_lock().lock() {
        Ok(g) => g.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub sync_ok: u64,
    pub sync_failed: u64,
    pub events_accepted: u64,
    pub events_suppressed: u64,
    pub roster_rebuilds: u64,
    pub session_teardowns: u64,
    pub poll_latency_avg_ms: Option<u64>,
}

pub fn snapshot() -> Snapshot {
    let sum = POLL_LATENCY_SUM_MS.load(Ordering::Relaxed);
    let count = POLL_LATENCY_COUNT.load(Ordering::Relaxed);
    Snapshot {
        sync_ok: SYNC_CYCLES_OK.load(Ordering::Relaxed),
        sync_failed: SYNC_CYCLES_FAILED.load(Ordering::Relaxed),
        events_accepted: EVENTS_ACCEPTED.load(Ordering::Relaxed),
        events_suppressed: EVENTS_SUPPRESSED.load(Ordering::Relaxed),
        roster_rebuilds: ROSTER_REBUILDS.load(Ordering::Relaxed),
        session_teardowns: SESSION_TEARDOWNS.load(Ordering::Relaxed),
        poll_latency_avg_ms: if count > 0 { Some(sum / count) } else { None },
    }
}
