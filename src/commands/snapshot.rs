// ABOUTME: Debug command - lists System B's current snapshot for one kind
// ABOUTME: Reports valid and malformed entry counts, optionally dumping the records

use anyhow::Result;
use serde::Serialize;

use crate::config::BridgeConfig;
use crate::model::{EntityKind, Record, SnapshotEntry};
use crate::remote::RemoteSource;

#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    pub kind: EntityKind,
    pub count: usize,
    pub malformed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Record>>,
}

pub fn summarize(kind: EntityKind, entries: Vec<SnapshotEntry>, dump: bool) -> SnapshotSummary {
    let mut records = Vec::new();
    let mut malformed = Vec::new();
    for entry in entries {
        match entry {
            SnapshotEntry::Valid(record) => records.push(record),
            SnapshotEntry::Malformed { reason } => malformed.push(reason),
        }
    }

    SnapshotSummary {
        kind,
        count: records.len(),
        malformed,
        data: dump.then_some(records),
    }
}

pub async fn snapshot(config: &BridgeConfig, kind: EntityKind, dump: bool) -> Result<()> {
    let client = config.crm_client()?;
    let entries = client.list_all(kind).await?;
    let summary = summarize(kind, entries, dump);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
