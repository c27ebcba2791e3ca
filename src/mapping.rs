// ABOUTME: Field mapping between the two systems' schemas
// ABOUTME: Inbound events become System B writes; System B records become System A notifications

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::model::{
    CompanyFields, CompanyRecord, InboundFields, InboundNote, PersonFields, PersonRecord, Record,
};

/// Separator between appended note entries (newest first).
pub const NOTE_SEPARATOR: &str = "\n---\n";

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn contact_list(value: &str) -> Value {
    json!([{ "value": value }])
}

/// Check that an inbound event carries the fields its mapping requires.
pub fn validate_inbound(fields: &InboundFields) -> Result<(), String> {
    match fields {
        InboundFields::Person(p) => {
            let has_name = !p.first_name.trim().is_empty() || !p.last_name.trim().is_empty();
            if !has_name && non_empty(&p.email).is_none() {
                return Err("person event needs a name or an email".to_string());
            }
            Ok(())
        }
        InboundFields::Company(c) => {
            if non_empty(&c.name).is_none() {
                return Err("company event needs a name".to_string());
            }
            Ok(())
        }
    }
}

/// System B write body for a person.
pub fn person_write_payload(fields: &PersonFields) -> Value {
    let mut body = Map::new();
    body.insert("firstName".into(), json!(fields.first_name));
    body.insert("lastName".into(), json!(fields.last_name));
    body.insert("jobTitle".into(), json!(fields.job_title));

    if let Some(email) = non_empty(&fields.email) {
        body.insert("emails".into(), contact_list(email));
    }
    if let Some(phone) = non_empty(&fields.phone) {
        body.insert("phones".into(), contact_list(phone));
    }
    if let Some(url) = non_empty(&fields.linkedin_url) {
        body.insert("urls".into(), contact_list(url));
    }
    Value::Object(body)
}

/// System B write body for a company.
pub fn company_write_payload(fields: &CompanyFields) -> Value {
    let mut body = Map::new();
    body.insert(
        "name".into(),
        json!(non_empty(&fields.name).unwrap_or_default()),
    );
    if let Some(website) = non_empty(&fields.website) {
        body.insert("urls".into(), contact_list(website));
    }
    Value::Object(body)
}

pub fn write_payload(fields: &InboundFields) -> Value {
    match fields {
        InboundFields::Person(p) => person_write_payload(p),
        InboundFields::Company(c) => company_write_payload(c),
    }
}

/// System A notification body for a person.
pub fn person_notification(person: &PersonRecord) -> Value {
    let mut body = Map::new();
    body.insert("record_id".into(), json!(person.id));
    body.insert("first_name".into(), json!(person.first_name));
    body.insert("last_name".into(), json!(person.last_name));
    body.insert(
        "email".into(),
        json!(person.emails.first().cloned().unwrap_or_default()),
    );
    body.insert(
        "phone".into(),
        json!(person.phones.first().cloned().unwrap_or_default()),
    );
    body.insert("position_title".into(), json!(person.job_title));
    body.insert("description".into(), json!(person.description));

    if let Some(linkedin) = person
        .urls
        .iter()
        .find(|url| url.to_lowercase().contains("linkedin"))
    {
        body.insert("linkedin_url".into(), json!(linkedin));
    }
    if let Some(company) = person.company_names.first() {
        body.insert("company_name".into(), json!(company));
    }
    Value::Object(body)
}

/// System A notification body for a company.
pub fn company_notification(company: &CompanyRecord) -> Value {
    json!({
        "record_id": company.id,
        "name": company.name,
        "website": company.urls.first().cloned().unwrap_or_default(),
    })
}

pub fn notification_payload(record: &Record) -> Value {
    match record {
        Record::Person(p) => person_notification(p),
        Record::Company(c) => company_notification(c),
    }
}

/// Render a note as `[TYPE] (date) content`.
pub fn format_note(note: &InboundNote) -> String {
    let note_type = non_empty(&note.note_type).unwrap_or("note");
    let mut formatted = format!("[{}]", note_type.to_uppercase());
    if let Some(date) = non_empty(&note.note_date) {
        formatted.push_str(&format!(" ({})", date));
    }
    formatted.push(' ');
    formatted.push_str(note.note.trim());
    formatted
}

/// Prefix a note entry with its UTC timestamp.
pub fn timestamped(entry: &str, now: DateTime<Utc>) -> String {
    format!("[{}] {}", now.format("%Y-%m-%d %H:%M UTC"), entry)
}

/// Place `entry` ahead of the existing field value.
pub fn prepend_note(current: &str, entry: &str) -> String {
    if current.is_empty() {
        entry.to_string()
    } else {
        format!("{}{}{}", entry, NOTE_SEPARATOR, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_person_write_payload() {
        let fields = PersonFields {
            first_name: "Jo".to_string(),
            last_name: "Bloggs".to_string(),
            job_title: "CTO".to_string(),
            email: Some("jo@x.com".to_string()),
            phone: Some("  ".to_string()),
            linkedin_url: Some("https://linkedin.com/in/jo".to_string()),
        };
        let body = person_write_payload(&fields);

        assert_eq!(body["firstName"], "Jo");
        assert_eq!(body["emails"], json!([{"value": "jo@x.com"}]));
        assert!(body.get("phones").is_none());
        assert_eq!(body["urls"][0]["value"], "https://linkedin.com/in/jo");
    }

    #[test]
    fn test_company_write_payload() {
        let body = company_write_payload(&CompanyFields {
            name: Some("Acme".to_string()),
            website: None,
        });
        assert_eq!(body, json!({"name": "Acme"}));
    }

    #[test]
    fn test_validate_inbound() {
        assert!(validate_inbound(&InboundFields::Person(PersonFields {
            email: Some("jo@x.com".to_string()),
            ..Default::default()
        }))
        .is_ok());
        assert!(validate_inbound(&InboundFields::Person(PersonFields::default())).is_err());
        assert!(validate_inbound(&InboundFields::Company(CompanyFields {
            name: Some(" ".to_string()),
            website: Some("https://acme.test".to_string()),
        }))
        .is_err());
    }

    #[test]
    fn test_person_notification() {
        let person = PersonRecord {
            id: "p1".to_string(),
            first_name: "Jo".to_string(),
            emails: vec!["jo@x.com".to_string(), "alt@x.com".to_string()],
            urls: vec![
                "https://jo.test".to_string(),
                "https://www.LinkedIn.com/in/jo".to_string(),
            ],
            company_names: vec!["Acme".to_string()],
            ..Default::default()
        };
        let body = person_notification(&person);

        assert_eq!(body["record_id"], "p1");
        assert_eq!(body["email"], "jo@x.com");
        assert_eq!(body["phone"], "");
        assert_eq!(body["linkedin_url"], "https://www.LinkedIn.com/in/jo");
        assert_eq!(body["company_name"], "Acme");
    }

    #[test]
    fn test_person_notification_without_optional_fields() {
        let body = person_notification(&PersonRecord {
            id: "p2".to_string(),
            ..Default::default()
        });
        assert!(body.get("linkedin_url").is_none());
        assert!(body.get("company_name").is_none());
    }

    #[test]
    fn test_company_notification() {
        let body = company_notification(&CompanyRecord {
            id: "c1".to_string(),
            name: "Acme".to_string(),
            urls: vec!["https://acme.test".to_string(), "https://x.test".to_string()],
        });
        assert_eq!(
            body,
            json!({"record_id": "c1", "name": "Acme", "website": "https://acme.test"})
        );
    }

    #[test]
    fn test_format_note() {
        let note = InboundNote {
            note: "  Called about the role ".to_string(),
            note_type: Some("activity".to_string()),
            note_date: Some("2024-01-15".to_string()),
            ..Default::default()
        };
        assert_eq!(format_note(&note), "[ACTIVITY] (2024-01-15) Called about the role");

        let plain = InboundNote {
            note: "Hello".to_string(),
            ..Default::default()
        };
        assert_eq!(format_note(&plain), "[NOTE] Hello");
    }

    #[test]
    fn test_timestamped_and_prepend() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 5, 0).unwrap();
        let entry = timestamped("[NOTE] Hello", now);
        assert_eq!(entry, "[2024-01-15 09:05 UTC] [NOTE] Hello");

        assert_eq!(prepend_note("", &entry), entry);
        assert_eq!(
            prepend_note("older", "newer"),
            format!("newer{}older", NOTE_SEPARATOR)
        );
    }
}
