// ABOUTME: Loop suppressor - detects changes that are echoes of our own writes
// ABOUTME: Marks are keyed by (source system, record id) and expire after a cooldown

use chrono::{DateTime, Duration, Utc};

use super::state::{mark_key, SyncState};
use crate::model::System;

/// How long after a sync a change to the same record is treated as an echo.
pub const COOLDOWN_SECS: i64 = 300;

/// How long a sync mark is retained before it is pruned.
pub const RETENTION_SECS: i64 = 3600;

pub fn cooldown() -> Duration {
    Duration::seconds(COOLDOWN_SECS)
}

pub fn retention() -> Duration {
    Duration::seconds(RETENTION_SECS)
}

/// True iff `id` was written because of a change from `source` within the cooldown.
pub fn should_suppress(state: &SyncState, id: &str, source: System, now: DateTime<Utc>) -> bool {
    match state.recent_sync(source, id) {
        Some(marked_at) => now - marked_at < cooldown(),
        None => false,
    }
}

/// Record that `id` was just written because of a change from `source`,
/// then prune every mark older than the retention window.
///
/// This is the only mutation path for `recent_syncs`.
pub fn mark_synced(state: &mut SyncState, id: &str, source: System, now: DateTime<Utc>) {
    state.recent_syncs.insert(mark_key(source, id), now);

    let cutoff = now - retention();
    let before = state.recent_syncs.len();
    state.recent_syncs.retain(|_, marked_at| *marked_at > cutoff);

    let pruned = before - state.recent_syncs.len();
    if pruned > 0 {
        tracing::debug!("Pruned {} expired sync marks", pruned);
    }
}
