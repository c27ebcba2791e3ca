// ABOUTME: Change-detection and loop-prevention synchronization engine
// ABOUTME: State store, fingerprinting, echo suppression, and the reconciliation flows

pub mod fingerprint;
pub mod outcome;
pub mod reconciler;
pub mod state;
pub mod store;
pub mod suppressor;

pub use fingerprint::{fingerprint, Fingerprint, SyncFields};
pub use outcome::{
    Classification, InboundError, InboundOutcome, KindReport, NoteOutcome, PollReport,
    PollStatus, RecordOutcome, RecordStatus, Response, SyncStats, WriteAction,
};
pub use reconciler::{Clock, LookupMissPolicy, ReconcileConfig, Reconciler, SystemClock};
pub use state::{RecordSyncEntry, SyncState};
pub use store::{FileStateStore, MemoryStateStore, StateLock, StateStore};
pub use suppressor::{mark_synced, should_suppress, COOLDOWN_SECS, RETENTION_SECS};
