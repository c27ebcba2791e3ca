// ABOUTME: Result types of reconciliation - per-record classifications, batch tallies, inbound responses
// ABOUTME: Callers can always tell success, skipped (nothing to do) and error apart

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::EntityKind;

/// How the outbound flow classified a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// No prior sync entry
    New,
    /// Fingerprint differs from the last delivered one
    Changed,
    /// Fingerprint equals the last delivered one
    Unchanged,
    /// Recently written by a sync; treated as an echo
    Suppressed,
}

impl Classification {
    pub fn needs_delivery(&self) -> bool {
        matches!(self, Classification::New | Classification::Changed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Synced,
    Skipped,
    Error,
}

/// What happened to one snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub id: Option<String>,
    pub classification: Option<Classification>,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-kind tallies of an outbound batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub synced: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl SyncStats {
    pub fn record(&mut self, status: RecordStatus) {
        match status {
            RecordStatus::Synced => self.synced += 1,
            RecordStatus::Skipped => self.skipped += 1,
            RecordStatus::Error => self.errors += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.synced + self.skipped + self.errors
    }

    /// Check if the batch completed without record errors.
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

/// Result of reconciling one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub kind: EntityKind,
    pub stats: SyncStats,
    pub outcomes: Vec<RecordOutcome>,
    pub duration_ms: u64,
}

impl KindReport {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            stats: SyncStats::default(),
            outcomes: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn push(&mut self, outcome: RecordOutcome) {
        self.stats.record(outcome.status);
        self.outcomes.push(outcome);
    }

    /// Outcome for a record id, if it was part of the batch.
    pub fn outcome(&self, id: &str) -> Option<&RecordOutcome> {
        self.outcomes.iter().find(|o| o.id.as_deref() == Some(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Completed,
    /// At least one kind could not be listed
    Partial,
}

/// Externally visible result of one outbound poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub status: PollStatus,
    pub timestamp: DateTime<Utc>,
    pub people: SyncStats,
    pub companies: SyncStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl PollReport {
    /// Every kind was listed and every record was handled without error.
    pub fn is_success(&self) -> bool {
        self.status == PollStatus::Completed
            && self.people.is_success()
            && self.companies.is_success()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Created,
    Updated,
}

/// Successful handling of an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Applied {
        record_id: String,
        action: WriteAction,
    },
    /// The event echoes a change we pushed out; nothing was written
    Suppressed { record_id: String },
}

/// Successful note append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteOutcome {
    pub record_id: String,
    pub person_name: String,
    pub field: String,
    pub group_id: String,
}

/// Failure of an inbound operation.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("no matching record for {0}")]
    NotFound(String),
    #[error("{count} records match {key}; refusing to pick one")]
    Ambiguous { key: String, count: usize },
    #[error("remote call failed: {0:#}")]
    Remote(anyhow::Error),
    #[error("sync state unavailable: {0:#}")]
    State(anyhow::Error),
}

impl InboundError {
    pub fn code(&self) -> &'static str {
        match self {
            InboundError::Malformed(_) => "malformed",
            InboundError::NotFound(_) => "not_found",
            InboundError::Ambiguous { .. } => "ambiguous",
            InboundError::Remote(_) => "remote",
            InboundError::State(_) => "state",
        }
    }
}

/// Caller-visible response of an inbound operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        record_id: String,
        details: BTreeMap<String, String>,
    },
    Skipped {
        record_id: Option<String>,
        reason: String,
    },
    Error {
        error: String,
        message: String,
    },
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

impl From<InboundError> for Response {
    fn from(e: InboundError) -> Self {
        Response::Error {
            error: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<Result<InboundOutcome, InboundError>> for Response {
    fn from(result: Result<InboundOutcome, InboundError>) -> Self {
        match result {
            Ok(InboundOutcome::Applied { record_id, action }) => {
                let action = match action {
                    WriteAction::Created => "created",
                    WriteAction::Updated => "updated",
                };
                Response::Success {
                    record_id,
                    details: BTreeMap::from([("action".to_string(), action.to_string())]),
                }
            }
            Ok(InboundOutcome::Suppressed { record_id }) => Response::Skipped {
                record_id: Some(record_id),
                reason: "recently synced from the other system".to_string(),
            },
            Err(e) => e.into(),
        }
    }
}

impl From<Result<NoteOutcome, InboundError>> for Response {
    fn from(result: Result<NoteOutcome, InboundError>) -> Self {
        match result {
            Ok(note) => Response::Success {
                record_id: note.record_id,
                details: BTreeMap::from([
                    ("person_name".to_string(), note.person_name),
                    ("field".to_string(), note.field),
                    ("group_id".to_string(), note.group_id),
                ]),
            },
            Err(e) => e.into(),
        }
    }
}
