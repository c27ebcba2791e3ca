// ABOUTME: In-memory stand-ins for both remote systems and a controllable clock
// ABOUTME: Shared by the reconciliation and inbound integration tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crm_sync_bridge::model::{
    Channel, CompanyRecord, EntityKind, InboundFields, PersonRecord, Record, SnapshotEntry,
};
use crm_sync_bridge::remote::{RemoteSink, RemoteSource};
use crm_sync_bridge::sync::{
    Clock, MemoryStateStore, ReconcileConfig, Reconciler, StateStore, SyncState,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

pub fn person(id: &str, first: &str, last: &str, email: &str) -> Record {
    Record::Person(PersonRecord {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        emails: if email.is_empty() {
            vec![]
        } else {
            vec![email.to_string()]
        },
        ..Default::default()
    })
}

pub fn company(id: &str, name: &str) -> Record {
    Record::Company(CompanyRecord {
        id: id.to_string(),
        name: name.to_string(),
        urls: vec![],
    })
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// System B held in memory.
#[derive(Default)]
pub struct FakeSource {
    pub entries: Mutex<HashMap<EntityKind, Vec<SnapshotEntry>>>,
    pub failing_kinds: Mutex<HashSet<EntityKind>>,
    pub writes: Mutex<Vec<(Option<String>, InboundFields)>>,
    pub notes: Mutex<HashMap<String, String>>,
    pub group_id: Mutex<Option<String>>,
    /// Latency added to every listing
    pub list_delay: Mutex<Option<std::time::Duration>>,
    next_id: Mutex<u32>,
}

impl FakeSource {
    pub fn new() -> Self {
        let source = Self::default();
        *source.group_id.lock().unwrap() = Some("grp_1".to_string());
        source
    }

    pub fn insert(&self, record: Record) {
        let mut entries = self.entries.lock().unwrap();
        let list = entries.entry(record.kind()).or_default();
        list.retain(|e| !matches!(e, SnapshotEntry::Valid(r) if r.id() == record.id()));
        list.push(SnapshotEntry::Valid(record));
    }

    pub fn insert_malformed(&self, kind: EntityKind, reason: &str) {
        self.entries
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(SnapshotEntry::malformed(reason));
    }

    pub fn set_list_delay(&self, delay: std::time::Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_listing(&self, kind: EntityKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    pub fn record(&self, kind: EntityKind, id: &str) -> Option<Record> {
        self.entries
            .lock()
            .unwrap()
            .get(&kind)
            .into_iter()
            .flatten()
            .find_map(|e| match e {
                SnapshotEntry::Valid(r) if r.id() == id => Some(r.clone()),
                _ => None,
            })
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn note_field(&self, person_id: &str) -> Option<String> {
        self.notes.lock().unwrap().get(person_id).cloned()
    }

    fn to_record(id: &str, fields: &InboundFields) -> Record {
        match fields {
            InboundFields::Person(p) => Record::Person(PersonRecord {
                id: id.to_string(),
                first_name: p.first_name.clone(),
                last_name: p.last_name.clone(),
                job_title: p.job_title.clone(),
                emails: p.email.clone().into_iter().collect(),
                phones: p.phone.clone().into_iter().collect(),
                urls: p.linkedin_url.clone().into_iter().collect(),
                ..Default::default()
            }),
            InboundFields::Company(c) => Record::Company(CompanyRecord {
                id: id.to_string(),
                name: c.name.clone().unwrap_or_default(),
                urls: c.website.clone().into_iter().collect(),
            }),
        }
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn list_all(&self, kind: EntityKind) -> Result<Vec<SnapshotEntry>> {
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_kinds.lock().unwrap().contains(&kind) {
            bail!("listing {} failed", kind.collection());
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_one(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        Ok(self.record(kind, id))
    }

    async fn create_or_update(
        &self,
        fields: &InboundFields,
        existing_id: Option<&str>,
    ) -> Result<String> {
        let id = match existing_id {
            Some(id) => id.to_string(),
            None => {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("new_{}", *next)
            }
        };
        self.writes
            .lock()
            .unwrap()
            .push((existing_id.map(str::to_string), fields.clone()));
        self.insert(Self::to_record(&id, fields));
        Ok(id)
    }

    async fn notes_group_id(&self) -> Result<Option<String>> {
        Ok(self.group_id.lock().unwrap().clone())
    }

    async fn append_note(
        &self,
        person_id: &str,
        _group_id: &str,
        _field: &str,
        entry: &str,
    ) -> Result<()> {
        let mut notes = self.notes.lock().unwrap();
        let current = notes.remove(person_id).unwrap_or_default();
        notes.insert(
            person_id.to_string(),
            crm_sync_bridge::mapping::prepend_note(&current, entry),
        );
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// System A's webhooks, recording every delivery.
#[derive(Default)]
pub struct FakeSink {
    pub calls: Mutex<Vec<(Channel, Value)>>,
    /// Record ids whose delivery fails
    pub failing_ids: Mutex<HashSet<String>>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn recover(&self) {
        self.failing_ids.lock().unwrap().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(Channel, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSink for FakeSink {
    async fn notify(&self, channel: Channel, payload: &Value) -> bool {
        self.calls.lock().unwrap().push((channel, payload.clone()));
        let id = payload["record_id"].as_str().unwrap_or_default();
        !self.failing_ids.lock().unwrap().contains(id)
    }

    fn is_configured(&self, _channel: Channel) -> bool {
        true
    }
}

/// State store that loads from memory but can never persist.
#[derive(Default)]
pub struct UnwritableStore {
    pub state: MemoryStateStore,
    pub save_attempts: Mutex<u32>,
}

#[async_trait]
impl StateStore for UnwritableStore {
    async fn load(&self) -> SyncState {
        self.state.load().await
    }

    async fn save(&self, _state: &SyncState) -> Result<()> {
        *self.save_attempts.lock().unwrap() += 1;
        bail!("disk full")
    }

    fn describe(&self) -> String {
        "unwritable".to_string()
    }
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub sink: Arc<FakeSink>,
    pub store: Arc<MemoryStateStore>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReconcileConfig::default())
    }

    pub fn with_config(config: ReconcileConfig) -> Self {
        let source = Arc::new(FakeSource::new());
        let sink = Arc::new(FakeSink::new());
        let store = Arc::new(MemoryStateStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let reconciler = Reconciler::new(
            store.clone() as Arc<dyn StateStore>,
            source.clone(),
            sink.clone(),
            config,
        )
        .with_clock(clock.clone());
        Self {
            source,
            sink,
            store,
            clock,
            reconciler,
        }
    }
}
