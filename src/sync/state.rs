// ABOUTME: SyncState for bidirectional reconciliation - last-known fingerprints per record
// ABOUTME: Also holds the recent-sync marks used to suppress echoed changes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::fingerprint::Fingerprint;
use crate::model::{EntityKind, System};

/// Sync state for a single record that has been pushed from System B to System A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSyncEntry {
    /// Fingerprint of the field subset as last delivered
    pub fingerprint: Fingerprint,
    /// Timestamp of the last successful delivery
    pub last_synced_at: DateTime<Utc>,
}

impl RecordSyncEntry {
    pub fn new(fingerprint: Fingerprint, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            last_synced_at: now,
        }
    }
}

/// Process-wide reconciliation state.
///
/// Loaded once at the start of each reconciliation operation and persisted
/// in full at the end of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    /// Completion time of the last B→A poll
    pub last_poll: Option<DateTime<Utc>>,
    /// Person sync entries, keyed by System B record id
    pub people: BTreeMap<String, RecordSyncEntry>,
    /// Company sync entries, keyed by System B record id
    pub companies: BTreeMap<String, RecordSyncEntry>,
    /// Recent-sync marks keyed by "<system>:<record id>"
    pub recent_syncs: BTreeMap<String, DateTime<Utc>>,
}

impl SyncState {
    /// Create a new empty SyncState
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for one entity kind.
    pub fn records(&self, kind: EntityKind) -> &BTreeMap<String, RecordSyncEntry> {
        match kind {
            EntityKind::Person => &self.people,
            EntityKind::Company => &self.companies,
        }
    }

    fn records_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<String, RecordSyncEntry> {
        match kind {
            EntityKind::Person => &mut self.people,
            EntityKind::Company => &mut self.companies,
        }
    }

    /// Get the sync entry for a record if it has been synchronized before
    pub fn get_record(&self, kind: EntityKind, id: &str) -> Option<&RecordSyncEntry> {
        self.records(kind).get(id)
    }

    /// Record a successful B→A delivery
    pub fn update_record(
        &mut self,
        kind: EntityKind,
        id: &str,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
    ) {
        self.records_mut(kind)
            .insert(id.to_string(), RecordSyncEntry::new(fingerprint, now));
    }

    /// Time of the last sync mark for `(source, id)`, if any
    pub fn recent_sync(&self, source: System, id: &str) -> Option<DateTime<Utc>> {
        self.recent_syncs.get(&mark_key(source, id)).copied()
    }
}

/// Key of a recent-sync mark.
pub fn mark_key(source: System, id: &str) -> String {
    format!("{}:{}", source.as_str(), id)
}
