use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

const EVENT_TYPE_FALLBACK: &str = "other";
const MAX_EVENT_TYPE_LEN: usize = 64;
const MAX_EVENT_TYPE_KEYS: usize = 32;

static WS_CONNECTIONS_ACTIVE: AtomicU64 = AtomicU64::new(0);
static WS_EVENTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static VOTES_ACCEPTED: AtomicU64 = AtomicU64::new(0);
static VOTES_REJECTED: AtomicU64 = AtomicU64::new(0);
static STORE_FALLBACKS: AtomicU64 = AtomicU64::new(0);
static WS_EVENTS_BY_TYPE: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

fn ws_events_by_type() -> &'static Mutex<HashMap<String, u64>> {
    WS_EVENTS_BY_TYPE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_ws_events_by_type() -> std::sync::MutexGuard<'static, HashMap<String, u64>> {
    match ws_events_by_type().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Event names are camelCase identifiers on the wire.
fn normalize_event_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_EVENT_TYPE_LEN {
        return EVENT_TYPE_FALLBACK.to_string();
    }
    if !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return EVENT_TYPE_FALLBACK.to_string();
    }
    trimmed.to_string()
}

pub fn ws_connection_open() {
    WS_CONNECTIONS_ACTIVE.fetch_add(1, Ordering::Relaxed);
}

pub fn ws_connection_close() {
    let _ = WS_CONNECTIONS_ACTIVE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(1))
    });
}

pub fn ws_event_dispatched(event_type: &str) {
    WS_EVENTS_TOTAL.fetch_add(1, Ordering::Relaxed);

    let mut normalized = normalize_event_type(event_type);
    let mut by_type = lock_ws_events_by_type();
    if !by_type.contains_key(&normalized) && by_type.len() >= MAX_EVENT_TYPE_KEYS {
        normalized = EVENT_TYPE_FALLBACK.to_string();
    }
    let entry = by_type.entry(normalized).or_insert(0);
    *entry = entry.saturating_add(1);
}

pub fn vote_accepted() {
    VOTES_ACCEPTED.fetch_add(1, Ordering::Relaxed);
}

pub fn vote_rejected() {
    VOTES_REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn store_fallback() {
    STORE_FALLBACKS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub active_connections: u64,
    pub total_events: u64,
    pub events_by_type: Vec<(String, u64)>,
    pub votes_accepted: u64,
    pub votes_rejected: u64,
    pub store_fallbacks: u64,
}

pub fn metrics_snapshot() -> MetricsSnapshot {
    let mut events_by_type: Vec<(String, u64)> = lock_ws_events_by_type()
        .iter()
        .map(|(event_type, count)| (event_type.clone(), *count))
        .collect();
    events_by_type.sort_by(|a, b| a.0.cmp(&b.0));

    MetricsSnapshot {
        active_connections: WS_CONNECTIONS_ACTIVE.load(Ordering::Relaxed),
        total_events: WS_EVENTS_TOTAL.load(Ordering::Relaxed),
        events_by_type,
        votes_accepted: VOTES_ACCEPTED.load(Ordering::Relaxed),
        votes_rejected: VOTES_REJECTED.load(Ordering::Relaxed),
        store_fallbacks: STORE_FALLBACKS.load(Ordering::Relaxed),
    }
}
