// ABOUTME: Collaborator contracts for the two remote systems
// ABOUTME: RemoteSource is the polled system (B); RemoteSink receives notifications (A)

pub mod client;
pub mod models;
pub mod webhook;

pub use client::CrmClient;
pub use webhook::WebhookSink;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

use crate::model::{Channel, EntityKind, InboundFields, Record, SnapshotEntry};

/// Deterministic key used to find an existing System B record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    Email(String),
    Name { first: String, last: String },
    CompanyName(String),
}

impl LookupKey {
    /// Case-insensitive exact match against a normalized record.
    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (LookupKey::Email(email), Record::Person(p)) => {
                p.emails.iter().any(|e| e.eq_ignore_ascii_case(email))
            }
            (LookupKey::Name { first, last }, Record::Person(p)) => {
                p.first_name.eq_ignore_ascii_case(first) && p.last_name.eq_ignore_ascii_case(last)
            }
            (LookupKey::CompanyName(name), Record::Company(c)) => c.name.eq_ignore_ascii_case(name),
            _ => false,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            LookupKey::Email(_) | LookupKey::Name { .. } => EntityKind::Person,
            LookupKey::CompanyName(_) => EntityKind::Company,
        }
    }
}

impl std::fmt::Display for LookupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupKey::Email(email) => write!(f, "email '{}'", email),
            LookupKey::Name { first, last } => write!(f, "name '{} {}'", first, last),
            LookupKey::CompanyName(name) => write!(f, "company name '{}'", name),
        }
    }
}

/// System B: the system of record that is polled for changes.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Full current snapshot of one kind, fully paginated and de-duplicated by id.
    async fn list_all(&self, kind: EntityKind) -> Result<Vec<SnapshotEntry>>;

    /// Fetch a single record; `Ok(None)` when it does not exist.
    async fn fetch_one(&self, kind: EntityKind, id: &str) -> Result<Option<Record>>;

    /// Create a record, or update `existing_id` when given. Returns the record id.
    async fn create_or_update(
        &self,
        fields: &InboundFields,
        existing_id: Option<&str>,
    ) -> Result<String>;

    /// All records matching `key`.
    async fn lookup(&self, key: &LookupKey) -> Result<Vec<Record>> {
        let matches = self
            .list_all(key.kind())
            .await?
            .into_iter()
            .filter_map(|entry| match entry {
                SnapshotEntry::Valid(record) if key.matches(&record) => Some(record),
                _ => None,
            })
            .collect();
        Ok(matches)
    }

    /// Group that owns the notes custom field, if any group exists.
    async fn notes_group_id(&self) -> Result<Option<String>>;

    /// Prepend `entry` to a text custom field on a person.
    async fn append_note(
        &self,
        person_id: &str,
        group_id: &str,
        field: &str,
        entry: &str,
    ) -> Result<()>;

    /// Connectivity check.
    async fn ping(&self) -> bool;
}

/// System A: receives change notifications from the outbound flow.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Deliver a notification. Transport failures are reported as `false`, never raised.
    async fn notify(&self, channel: Channel, payload: &Value) -> bool;

    /// Whether a destination is configured for `channel`.
    fn is_configured(&self, channel: Channel) -> bool;
}

/// Drop entries whose id was already seen, keeping the first occurrence.
///
/// Malformed entries carry no id and are always kept.
pub fn dedupe_by_id(entries: Vec<SnapshotEntry>) -> Vec<SnapshotEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| match entry {
            SnapshotEntry::Valid(record) => seen.insert(record.id().to_string()),
            SnapshotEntry::Malformed { .. } => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompanyRecord, PersonRecord};

    fn person(id: &str, first: &str, last: &str, email: &str) -> Record {
        Record::Person(PersonRecord {
            id: id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            emails: vec![email.to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_lookup_email_is_case_insensitive() {
        let record = person("p1", "Jo", "Bloggs", "Jo@X.com");
        assert!(LookupKey::Email("jo@x.com".to_string()).matches(&record));
        assert!(!LookupKey::Email("jo@y.com".to_string()).matches(&record));
    }

    #[test]
    fn test_lookup_name_requires_both_parts() {
        let record = person("p1", "Jo", "Bloggs", "jo@x.com");
        let key = LookupKey::Name {
            first: "jo".to_string(),
            last: "BLOGGS".to_string(),
        };
        assert!(key.matches(&record));

        let partial = LookupKey::Name {
            first: "jo".to_string(),
            last: String::new(),
        };
        assert!(!partial.matches(&record));
    }

    #[test]
    fn test_lookup_kind_mismatch_never_matches() {
        let company = Record::Company(CompanyRecord {
            id: "c1".to_string(),
            name: "jo@x.com".to_string(),
            urls: vec![],
        });
        assert!(!LookupKey::Email("jo@x.com".to_string()).matches(&company));
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let entries = vec![
            SnapshotEntry::Valid(person("p1", "Jo", "A", "a@x.com")),
            SnapshotEntry::malformed("not an object"),
            SnapshotEntry::Valid(person("p1", "Jo", "B", "b@x.com")),
            SnapshotEntry::Valid(person("p2", "Al", "C", "c@x.com")),
            SnapshotEntry::malformed("not an object"),
        ];

        let deduped = dedupe_by_id(entries);
        assert_eq!(deduped.len(), 4);
        match &deduped[0] {
            SnapshotEntry::Valid(Record::Person(p)) => assert_eq!(p.last_name, "A"),
            other => panic!("unexpected entry: {:?}", other),
        }
    }
}
