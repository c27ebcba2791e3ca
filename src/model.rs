// ABOUTME: Canonical record types shared by the sync engine and the adapters
// ABOUTME: Remote payload shapes are normalized into these before reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kinds that are reconciled between the two systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Company,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Person, EntityKind::Company];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Company => "company",
        }
    }

    /// Plural collection name, used for state partitions and REST paths.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Person => "people",
            EntityKind::Company => "companies",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "person" | "people" => Ok(EntityKind::Person),
            "company" | "companies" => Ok(EntityKind::Company),
            other => anyhow::bail!("Unknown entity kind '{}'", other),
        }
    }
}

/// Originating system of a change.
///
/// System A pushes change notifications to us; System B is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum System {
    A,
    B,
}

impl System {
    pub fn as_str(&self) -> &'static str {
        match self {
            System::A => "A",
            System::B => "B",
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a change creates a counterpart record or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    New,
    Update,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Update => "update",
        }
    }
}

impl FromStr for ChangeKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "new" | "create" => Ok(ChangeKind::New),
            "update" => Ok(ChangeKind::Update),
            other => anyhow::bail!("Unknown change kind '{}'", other),
        }
    }
}

/// Outbound notification channel on System A: one per kind and change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    pub kind: EntityKind,
    pub change: ChangeKind,
}

impl Channel {
    pub fn new(kind: EntityKind, change: ChangeKind) -> Self {
        Self { kind, change }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.change.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub urls: Vec<String>,
    pub job_title: String,
    pub description: String,
    pub company_names: Vec<String>,
}

impl PersonRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: String,
    pub name: String,
    pub urls: Vec<String>,
}

/// A System B record after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Person(PersonRecord),
    Company(CompanyRecord),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Person(p) => &p.id,
            Record::Company(c) => &c.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Person(_) => EntityKind::Person,
            Record::Company(_) => EntityKind::Company,
        }
    }
}

/// One entry of a System B snapshot.
///
/// Entries whose shape could not be normalized are carried through so the
/// batch can count them as errors without aborting.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEntry {
    Valid(Record),
    Malformed { reason: String },
}

impl SnapshotEntry {
    pub fn malformed(reason: impl Into<String>) -> Self {
        SnapshotEntry::Malformed {
            reason: reason.into(),
        }
    }
}

/// Person fields as delivered by a System A change notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonFields {
    pub first_name: String,
    pub last_name: String,
    pub job_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
}

/// Company fields as delivered by a System A change notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyFields {
    #[serde(alias = "company_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InboundFields {
    Person(PersonFields),
    Company(CompanyFields),
}

impl InboundFields {
    pub fn kind(&self) -> EntityKind {
        match self {
            InboundFields::Person(_) => EntityKind::Person,
            InboundFields::Company(_) => EntityKind::Company,
        }
    }
}

/// A normalized change notification from System A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub change: ChangeKind,
    /// Id of the counterpart record in System B, when System A knows it.
    pub record_id: Option<String>,
    pub fields: InboundFields,
}

impl InboundEvent {
    /// Build an event from a raw System A payload.
    pub fn from_payload(
        kind: EntityKind,
        change: ChangeKind,
        payload: serde_json::Value,
    ) -> anyhow::Result<Self> {
        let record_id = payload
            .get("record_id")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let fields = match kind {
            EntityKind::Person => InboundFields::Person(serde_json::from_value(payload)?),
            EntityKind::Company => InboundFields::Company(serde_json::from_value(payload)?),
        };

        Ok(Self {
            change,
            record_id,
            fields,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.fields.kind()
    }
}

/// A note from System A to be appended to a System B person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundNote {
    pub record_id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub note: String,
    pub note_type: Option<String>,
    pub note_date: Option<String>,
}
