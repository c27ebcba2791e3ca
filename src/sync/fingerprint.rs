// ABOUTME: Change fingerprint over the sync-relevant subset of a record
// ABOUTME: Canonical JSON (sorted keys, normalized lists) hashed with SHA-256, truncated to 128 bits

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{CompanyRecord, PersonRecord, Record};

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 16;

/// Hex digest of a record's synchronized fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value in the sync allow-list.
#[derive(Debug, Clone)]
pub enum FieldValue<'a> {
    Text(&'a str),
    /// List where position carries meaning (e.g. the primary email comes first).
    Ordered(&'a [String]),
    /// List compared as a set of values.
    Unordered(&'a [String]),
}

/// Records that expose an explicit allow-list of synchronized fields.
pub trait SyncFields {
    fn sync_fields(&self) -> BTreeMap<&'static str, FieldValue<'_>>;
}

impl SyncFields for PersonRecord {
    fn sync_fields(&self) -> BTreeMap<&'static str, FieldValue<'_>> {
        BTreeMap::from([
            ("firstName", FieldValue::Text(&self.first_name)),
            ("lastName", FieldValue::Text(&self.last_name)),
            ("emails", FieldValue::Ordered(&self.emails)),
            ("phones", FieldValue::Ordered(&self.phones)),
            ("jobTitle", FieldValue::Text(&self.job_title)),
            ("urls", FieldValue::Unordered(&self.urls)),
        ])
    }
}

impl SyncFields for CompanyRecord {
    fn sync_fields(&self) -> BTreeMap<&'static str, FieldValue<'_>> {
        BTreeMap::from([
            ("name", FieldValue::Text(&self.name)),
            ("urls", FieldValue::Ordered(&self.urls)),
        ])
    }
}

impl SyncFields for Record {
    fn sync_fields(&self) -> BTreeMap<&'static str, FieldValue<'_>> {
        match self {
            Record::Person(p) => p.sync_fields(),
            Record::Company(c) => c.sync_fields(),
        }
    }
}

/// Canonical string form of the allow-listed fields.
///
/// Keys are emitted in lexicographic order and unordered lists are sorted, so
/// semantically identical inputs serialize identically.
pub fn canonical_form<T: SyncFields + ?Sized>(record: &T) -> String {
    let canonical: BTreeMap<&'static str, Value> = record
        .sync_fields()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                FieldValue::Text(text) => Value::String(text.to_string()),
                FieldValue::Ordered(items) => {
                    Value::Array(items.iter().cloned().map(Value::String).collect())
                }
                FieldValue::Unordered(items) => {
                    let mut sorted = items.to_vec();
                    sorted.sort();
                    Value::Array(sorted.into_iter().map(Value::String).collect())
                }
            };
            (key, value)
        })
        .collect();

    // BTreeMap keys serialize in sorted order; strings and arrays have a single JSON form.
    serde_json::to_string(&canonical).unwrap_or_default()
}

/// Compute the change fingerprint of a record.
pub fn fingerprint<T: SyncFields + ?Sized>(record: &T) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(record).as_bytes());
    let digest = hasher.finalize();

    let hex = digest[..FINGERPRINT_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    Fingerprint(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> PersonRecord {
        PersonRecord {
            id: "p1".to_string(),
            first_name: "Jo".to_string(),
            last_name: "Bloggs".to_string(),
            emails: vec!["jo@x.com".to_string(), "jo@home.test".to_string()],
            phones: vec!["+44 1234".to_string()],
            urls: vec![
                "https://linkedin.com/in/jo".to_string(),
                "https://jo.test".to_string(),
            ],
            job_title: "CTO".to_string(),
            description: "met at conference".to_string(),
            company_names: vec!["Acme".to_string()],
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let record = person();
        assert_eq!(fingerprint(&record), fingerprint(&record));
        assert_eq!(fingerprint(&record).as_str().len(), FINGERPRINT_BYTES * 2);
    }

    #[test]
    fn test_canonical_form_sorts_keys() {
        let company = CompanyRecord {
            id: "c1".to_string(),
            name: "Acme".to_string(),
            urls: vec!["https://acme.test".to_string()],
        };
        assert_eq!(
            canonical_form(&company),
            r#"{"name":"Acme","urls":["https://acme.test"]}"#
        );
    }

    #[test]
    fn test_unordered_list_reorder_keeps_fingerprint() {
        let a = person();
        let mut b = person();
        b.urls.reverse();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_ordered_list_reorder_changes_fingerprint() {
        let a = person();
        let mut b = person();
        b.emails.reverse();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_allow_listed_field_changes_fingerprint() {
        let base = fingerprint(&person());
        let mutations: [fn(&mut PersonRecord); 6] = [
            |p| p.first_name.push('e'),
            |p| p.last_name.clear(),
            |p| p.emails.push("new@x.com".to_string()),
            |p| p.phones.clear(),
            |p| p.job_title = "CEO".to_string(),
            |p| {
                p.urls.pop();
            },
        ];
        for mutate in mutations {
            let mut changed = person();
            mutate(&mut changed);
            assert_ne!(base, fingerprint(&changed));
        }
    }

    #[test]
    fn test_fields_outside_allow_list_are_ignored() {
        let mut changed = person();
        changed.id = "other".to_string();
        changed.description = "updated bio".to_string();
        changed.company_names.clear();
        assert_eq!(fingerprint(&person()), fingerprint(&changed));
    }

    #[test]
    fn test_text_boundaries_are_unambiguous() {
        let mut a = person();
        a.first_name = "Jo".to_string();
        a.last_name = "Ann".to_string();
        let mut b = person();
        b.first_name = "JoA".to_string();
        b.last_name = "nn".to_string();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
