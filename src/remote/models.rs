// ABOUTME: System B wire shapes and their normalization into canonical records
// ABOUTME: Every accepted payload variant is resolved here, before the sync engine sees it

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::model::{CompanyRecord, EntityKind, PersonRecord, Record, SnapshotEntry};

/// A contact value is delivered either as a bare string or as `{ "value": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContactValue {
    Plain(String),
    Tagged { value: String },
}

impl ContactValue {
    pub fn into_string(self) -> String {
        match self {
            ContactValue::Plain(v) | ContactValue::Tagged { value: v } => v,
        }
    }
}

/// Listing items arrive either as a list or as an id → record map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Items {
    List(Vec<Value>),
    Map(Map<String, Value>),
}

impl Items {
    fn into_values(self) -> Vec<Value> {
        match self {
            Items::List(values) => values,
            Items::Map(map) => map.into_iter().map(|(_, v)| v).collect(),
        }
    }

    fn first_id(&self) -> Option<String> {
        match self {
            Items::List(values) => values
                .first()
                .and_then(|v| v.get("id"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Items::Map(map) => map.keys().next().cloned(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// One page of a listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPage {
    pub items: Option<Items>,
    pub data: Option<Items>,
    pub pagination: Option<Pagination>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

impl ListPage {
    /// Cursor for the following page, if any.
    pub fn next_cursor(&self) -> Option<String> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next_cursor.clone())
            .or_else(|| self.next_cursor.clone())
            .filter(|c| !c.is_empty())
    }

    /// Raw entries on this page.
    pub fn into_values(self) -> Vec<Value> {
        self.items
            .or(self.data)
            .map(Items::into_values)
            .unwrap_or_default()
    }

    /// Id of the first item on the page.
    pub fn first_id(&self) -> Option<String> {
        self.items.as_ref().or(self.data.as_ref())?.first_id()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompanyRef {
    Named { name: String },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPerson {
    id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    emails: Option<Vec<ContactValue>>,
    phones: Option<Vec<ContactValue>>,
    urls: Option<Vec<ContactValue>>,
    job_title: Option<String>,
    description: Option<String>,
    companies: Option<Vec<CompanyRef>>,
}

#[derive(Debug, Deserialize)]
struct RawCompany {
    id: String,
    name: Option<String>,
    urls: Option<Vec<ContactValue>>,
}

fn contact_strings(values: Option<Vec<ContactValue>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(ContactValue::into_string)
        .collect()
}

impl From<RawPerson> for PersonRecord {
    fn from(raw: RawPerson) -> Self {
        let company_names = raw
            .companies
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| match c {
                CompanyRef::Named { name } => Some(name),
                CompanyRef::Other(_) => None,
            })
            .collect();

        PersonRecord {
            id: raw.id,
            first_name: raw.first_name.unwrap_or_default(),
            last_name: raw.last_name.unwrap_or_default(),
            emails: contact_strings(raw.emails),
            phones: contact_strings(raw.phones),
            urls: contact_strings(raw.urls),
            job_title: raw.job_title.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            company_names,
        }
    }
}

impl From<RawCompany> for CompanyRecord {
    fn from(raw: RawCompany) -> Self {
        CompanyRecord {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            urls: contact_strings(raw.urls),
        }
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Unwrap a `{ "data": {...} }` envelope around a single record.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if !map.contains_key("id") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Normalize one raw snapshot entry.
pub fn normalize_entry(kind: EntityKind, value: Value) -> SnapshotEntry {
    // Some listings wrap each record in a one-element list
    let value = match value {
        Value::Array(mut items) if matches!(items.first(), Some(Value::Object(_))) => {
            items.swap_remove(0)
        }
        other => other,
    };

    if !value.is_object() {
        return SnapshotEntry::malformed(format!(
            "expected {} object, got {}",
            kind,
            value_type(&value)
        ));
    }

    let record = match kind {
        EntityKind::Person => serde_json::from_value::<RawPerson>(value)
            .map(|raw| Record::Person(PersonRecord::from(raw))),
        EntityKind::Company => serde_json::from_value::<RawCompany>(value)
            .map(|raw| Record::Company(CompanyRecord::from(raw))),
    };

    match record {
        Ok(record) if record.id().trim().is_empty() => {
            SnapshotEntry::malformed(format!("{} without an id", kind))
        }
        Ok(record) => SnapshotEntry::Valid(record),
        Err(e) => SnapshotEntry::malformed(format!("unexpected {} shape: {}", kind, e)),
    }
}

/// Id of a record returned by a create call.
pub fn created_id(response: Value) -> Option<String> {
    unwrap_envelope(response)
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Current value of a text custom field on a raw person payload.
pub fn custom_field_value(person: &Value, group_id: &str, field: &str) -> String {
    person
        .get("customFieldValues")
        .and_then(|groups| groups.get(group_id))
        .and_then(|fields| fields.get(field))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// PATCH body setting a text custom field.
pub fn custom_field_patch(group_id: &str, field: &str, value: &str) -> Value {
    json!({
        "customFieldValues": {
            group_id: {
                field: value
            }
        }
    })
}
