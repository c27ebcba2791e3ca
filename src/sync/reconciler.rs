// ABOUTME: Reconciliation engine - inbound (A→B) event handling and outbound (B→A) poll batches
// ABOUTME: Fingerprints, suppresses echoes, classifies records, and delegates writes to adapters

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::fingerprint::{fingerprint, Fingerprint};
use super::outcome::{
    Classification, InboundError, InboundOutcome, KindReport, NoteOutcome, PollReport,
    PollStatus, RecordOutcome, RecordStatus, WriteAction,
};
use super::state::SyncState;
use super::store::StateStore;
use super::suppressor::{mark_synced, should_suppress};
use crate::mapping;
use crate::model::{
    ChangeKind, Channel, EntityKind, InboundEvent, InboundFields, InboundNote, Record,
    SnapshotEntry, System,
};
use crate::remote::{LookupKey, RemoteSink, RemoteSource};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What to do when an update event matches no existing record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupMissPolicy {
    /// Create the record
    #[default]
    Create,
    /// Reject the event as not found
    Fail,
}

impl std::str::FromStr for LookupMissPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "create" => Ok(LookupMissPolicy::Create),
            "fail" => Ok(LookupMissPolicy::Fail),
            other => anyhow::bail!("Unknown lookup miss policy '{}' (use create or fail)", other),
        }
    }
}

/// Configuration for reconciliation behavior.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub lookup_miss: LookupMissPolicy,
    /// Text custom field that receives inbound notes
    pub notes_field: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            lookup_miss: LookupMissPolicy::Create,
            notes_field: "Synced Notes".to_string(),
        }
    }
}

/// Classify a valid snapshot record against the stored state.
pub fn classify(
    state: &SyncState,
    record: &Record,
    fingerprint: &Fingerprint,
    now: DateTime<Utc>,
) -> Classification {
    let id = record.id();
    // A mark from A means we just wrote this record on behalf of A; a mark from B
    // means it was pushed out moments ago and is re-evaluated after the cooldown.
    if should_suppress(state, id, System::A, now) || should_suppress(state, id, System::B, now) {
        return Classification::Suppressed;
    }

    match state.get_record(record.kind(), id) {
        Some(entry) if &entry.fingerprint == fingerprint => Classification::Unchanged,
        Some(_) => Classification::Changed,
        None => Classification::New,
    }
}

/// Reconciler orchestrates both synchronization directions.
///
/// Every operation runs as one critical section: state is loaded after the
/// lock is taken and persisted before it is released. The in-process mutex
/// orders operations of this reconciler; the store's lock orders them against
/// other processes sharing the same state.
pub struct Reconciler {
    store: Arc<dyn StateStore>,
    source: Arc<dyn RemoteSource>,
    sink: Arc<dyn RemoteSink>,
    clock: Arc<dyn Clock>,
    config: ReconcileConfig,
    lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn StateStore>,
        source: Arc<dyn RemoteSource>,
        sink: Arc<dyn RemoteSink>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            source,
            sink,
            clock: Arc::new(SystemClock),
            config,
            lock: Mutex::new(()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Persist state; failures are logged and the operation carries on.
    async fn persist(&self, state: &SyncState) {
        if let Err(e) = self.store.save(state).await {
            tracing::error!(
                "Failed to persist sync state to {}: {:?}",
                self.store.describe(),
                e
            );
        }
    }

    /// Current persisted state.
    pub async fn current_state(&self) -> Result<SyncState> {
        let _guard = self.lock.lock().await;
        let _state_lock = self.store.lock().await?;
        Ok(self.store.load().await)
    }

    /// Replace the persisted state with an empty one.
    pub async fn reset_state(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let _state_lock = self.store.lock().await?;
        self.store.save(&SyncState::new()).await?;
        tracing::info!("Sync state at {} reset", self.store.describe());
        Ok(())
    }

    // ==================== B → A ====================

    /// Run one outbound poll cycle over every entity kind.
    pub async fn run_poll(&self) -> PollReport {
        tracing::info!("Starting outbound poll at {}", self.clock.now());
        let mut report = PollReport {
            status: PollStatus::Completed,
            timestamp: self.clock.now(),
            people: Default::default(),
            companies: Default::default(),
            errors: Vec::new(),
        };

        for kind in EntityKind::ALL {
            match self.sync_kind(kind).await {
                Ok(kind_report) => match kind {
                    EntityKind::Person => report.people = kind_report.stats,
                    EntityKind::Company => report.companies = kind_report.stats,
                },
                Err(e) => {
                    // Log with :? to show full error chain including root cause
                    tracing::error!("Failed to poll {}: {:?}", kind.collection(), e);
                    report.status = PollStatus::Partial;
                    report
                        .errors
                        .push(format!("Failed to poll {}: {:#}", kind.collection(), e));
                }
            }
        }

        report.timestamp = self.clock.now();
        tracing::info!(
            "Outbound poll completed: people {:?}, companies {:?}",
            report.people,
            report.companies
        );
        report
    }

    /// Reconcile the full current snapshot of one kind against System A.
    ///
    /// Fails only when the snapshot itself cannot be listed; in that case the
    /// state is left untouched.
    pub async fn sync_kind(&self, kind: EntityKind) -> Result<KindReport> {
        let start = Instant::now();
        let _guard = self.lock.lock().await;
        let _state_lock = self.store.lock().await?;
        let mut state = self.store.load().await;

        let snapshot = self.source.list_all(kind).await?;
        tracing::info!("Processing {} {}", snapshot.len(), kind.collection());

        let mut report = KindReport::new(kind);
        for entry in snapshot {
            let outcome = match entry {
                SnapshotEntry::Valid(record) => self.sync_record(&mut state, kind, record).await,
                SnapshotEntry::Malformed { reason } => {
                    tracing::warn!("Skipping malformed {} entry: {}", kind, reason);
                    RecordOutcome {
                        id: None,
                        classification: None,
                        status: RecordStatus::Error,
                        message: Some(reason),
                    }
                }
            };
            report.push(outcome);
        }

        state.last_poll = Some(self.clock.now());
        self.persist(&state).await;

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Completed {} sync: {} synced, {} skipped, {} errors in {}ms",
            kind,
            report.stats.synced,
            report.stats.skipped,
            report.stats.errors,
            report.duration_ms
        );
        Ok(report)
    }

    async fn sync_record(
        &self,
        state: &mut SyncState,
        kind: EntityKind,
        record: Record,
    ) -> RecordOutcome {
        let id = record.id().to_string();
        if record.kind() != kind {
            return RecordOutcome {
                id: Some(id),
                classification: None,
                status: RecordStatus::Error,
                message: Some(format!("expected {} but got {}", kind, record.kind())),
            };
        }

        let now = self.clock.now();
        let current = fingerprint(&record);
        let classification = classify(state, &record, &current, now);

        if !classification.needs_delivery() {
            tracing::debug!("Skipping {} {} ({:?})", kind, id, classification);
            return RecordOutcome {
                id: Some(id),
                classification: Some(classification),
                status: RecordStatus::Skipped,
                message: None,
            };
        }

        let change = match classification {
            Classification::New => ChangeKind::New,
            _ => ChangeKind::Update,
        };
        let channel = Channel::new(kind, change);
        let payload = mapping::notification_payload(&record);

        if self.sink.notify(channel, &payload).await {
            state.update_record(kind, &id, current, now);
            mark_synced(state, &id, System::B, now);
            tracing::info!("Synced {} {} via {}", kind, id, channel);
            RecordOutcome {
                id: Some(id),
                classification: Some(classification),
                status: RecordStatus::Synced,
                message: None,
            }
        } else {
            tracing::warn!("Delivery of {} {} via {} failed", kind, id, channel);
            RecordOutcome {
                id: Some(id),
                classification: Some(classification),
                status: RecordStatus::Error,
                message: Some(format!("delivery via {} failed", channel)),
            }
        }
    }

    // ==================== A → B ====================

    /// Apply a change notification from System A to System B.
    pub async fn apply_inbound(
        &self,
        event: &InboundEvent,
    ) -> Result<InboundOutcome, InboundError> {
        let kind = event.kind();
        tracing::info!(
            "Inbound {} {} (record id: {:?})",
            kind,
            event.change.as_str(),
            event.record_id
        );

        mapping::validate_inbound(&event.fields).map_err(InboundError::Malformed)?;

        let _guard = self.lock.lock().await;
        let _state_lock = self.store.lock().await.map_err(InboundError::State)?;
        let mut state = self.store.load().await;

        let existing = self.resolve_counterpart(event).await?;
        let now = self.clock.now();

        if let Some(id) = &existing {
            if should_suppress(&state, id, System::B, now) {
                tracing::info!("Skipping inbound {} {} - recently synced to System A", kind, id);
                return Ok(InboundOutcome::Suppressed {
                    record_id: id.clone(),
                });
            }
        }

        let record_id = self
            .source
            .create_or_update(&event.fields, existing.as_deref())
            .await
            .map_err(InboundError::Remote)?;

        mark_synced(&mut state, &record_id, System::A, now);
        self.persist(&state).await;

        let action = if existing.is_some() {
            WriteAction::Updated
        } else {
            WriteAction::Created
        };
        tracing::info!("Inbound {} {} {:?}", kind, record_id, action);
        Ok(InboundOutcome::Applied { record_id, action })
    }

    /// Find the System B record an inbound event refers to.
    ///
    /// `Ok(None)` means the event should create a new record.
    async fn resolve_counterpart(
        &self,
        event: &InboundEvent,
    ) -> Result<Option<String>, InboundError> {
        let kind = event.kind();

        if let Some(id) = &event.record_id {
            let found = self
                .source
                .fetch_one(kind, id)
                .await
                .map_err(InboundError::Remote)?;
            if found.is_some() {
                return Ok(Some(id.clone()));
            }
            tracing::info!("{} {} not found by id, falling back to lookup", kind, id);
        } else if event.change == ChangeKind::New {
            return Ok(None);
        }

        let Some(key) = lookup_key(&event.fields) else {
            return self.on_lookup_miss(kind, "an event without lookup fields".to_string());
        };

        match self.lookup_unique(&key).await? {
            Some(record) => Ok(Some(record.id().to_string())),
            None => self.on_lookup_miss(kind, key.to_string()),
        }
    }

    fn on_lookup_miss(
        &self,
        kind: EntityKind,
        searched: String,
    ) -> Result<Option<String>, InboundError> {
        match self.config.lookup_miss {
            LookupMissPolicy::Create => {
                tracing::info!("No {} matches {}, creating a new one", kind, searched);
                Ok(None)
            }
            LookupMissPolicy::Fail => Err(InboundError::NotFound(searched)),
        }
    }

    /// Exactly one match, none, or an ambiguity error.
    async fn lookup_unique(&self, key: &LookupKey) -> Result<Option<Record>, InboundError> {
        let mut matches = self
            .source
            .lookup(key)
            .await
            .map_err(InboundError::Remote)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(InboundError::Ambiguous {
                key: key.to_string(),
                count,
            }),
        }
    }

    /// Append a System A note to the matching System B person.
    pub async fn apply_note(&self, note: &InboundNote) -> Result<NoteOutcome, InboundError> {
        if note.note.trim().is_empty() {
            return Err(InboundError::Malformed(
                "No note content provided".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;
        let _state_lock = self.store.lock().await.map_err(InboundError::State)?;
        let mut state = self.store.load().await;

        let person = self.resolve_note_person(note).await?;
        let (person_id, person_name) = match &person {
            Record::Person(p) => (p.id.clone(), p.full_name()),
            Record::Company(c) => (c.id.clone(), c.name.clone()),
        };

        let group_id = self
            .source
            .notes_group_id()
            .await
            .map_err(InboundError::Remote)?
            .ok_or_else(|| {
                InboundError::Remote(anyhow::anyhow!("No group found for custom fields"))
            })?;

        let now = self.clock.now();
        let entry = mapping::timestamped(&mapping::format_note(note), now);
        self.source
            .append_note(&person_id, &group_id, &self.config.notes_field, &entry)
            .await
            .map_err(InboundError::Remote)?;

        mark_synced(&mut state, &person_id, System::A, now);
        self.persist(&state).await;

        tracing::info!("Appended note to person {} ({})", person_id, person_name);
        Ok(NoteOutcome {
            record_id: person_id,
            person_name,
            field: self.config.notes_field.clone(),
            group_id,
        })
    }

    /// Resolution order: direct id, then email, then name. A miss is a hard failure.
    async fn resolve_note_person(&self, note: &InboundNote) -> Result<Record, InboundError> {
        if let Some(id) = non_empty(&note.record_id) {
            let found = self
                .source
                .fetch_one(EntityKind::Person, id)
                .await
                .map_err(InboundError::Remote)?;
            if let Some(record) = found {
                return Ok(record);
            }
        }

        if let Some(email) = non_empty(&note.email) {
            if let Some(record) = self
                .lookup_unique(&LookupKey::Email(email.to_string()))
                .await?
            {
                return Ok(record);
            }
        }

        let first = non_empty(&note.first_name).unwrap_or_default();
        let last = non_empty(&note.last_name).unwrap_or_default();
        if !first.is_empty() || !last.is_empty() {
            let key = LookupKey::Name {
                first: first.to_string(),
                last: last.to_string(),
            };
            if let Some(record) = self.lookup_unique(&key).await? {
                return Ok(record);
            }
        }

        Err(InboundError::NotFound(format!(
            "person (id: {}, email: {}, name: '{} {}')",
            note.record_id.as_deref().unwrap_or("-"),
            note.email.as_deref().unwrap_or("-"),
            first,
            last
        )))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Deterministic lookup key for an inbound event: email first, name as fallback.
pub fn lookup_key(fields: &InboundFields) -> Option<LookupKey> {
    match fields {
        InboundFields::Person(p) => {
            if let Some(email) = non_empty(&p.email) {
                return Some(LookupKey::Email(email.to_string()));
            }
            let first = p.first_name.trim();
            let last = p.last_name.trim();
            if first.is_empty() && last.is_empty() {
                return None;
            }
            Some(LookupKey::Name {
                first: first.to_string(),
                last: last.to_string(),
            })
        }
        InboundFields::Company(c) => {
            non_empty(&c.name).map(|name| LookupKey::CompanyName(name.to_string()))
        }
    }
}
