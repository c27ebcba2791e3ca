// ABOUTME: Inbound commands - apply a System A change event or note to System B
// ABOUTME: Payloads are read as JSON from a file or stdin; the response is printed as JSON

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use crate::config::BridgeConfig;
use crate::model::{ChangeKind, EntityKind, InboundEvent, InboundNote};
use crate::sync::{InboundError, Response};

/// Read a JSON payload from `file`, or from stdin when no file (or `-`) is given.
pub fn read_payload(file: Option<&Path>) -> Result<serde_json::Value> {
    let contents = match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload from {:?}", path))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read payload from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&contents).context("Payload is not valid JSON")
}

fn print_response(response: &Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

/// Apply one change event.
pub async fn apply(
    config: &BridgeConfig,
    kind: EntityKind,
    change: ChangeKind,
    payload: serde_json::Value,
) -> Result<Response> {
    let response = match InboundEvent::from_payload(kind, change, payload) {
        Ok(event) => {
            let reconciler = config.build_reconciler()?;
            Response::from(reconciler.apply_inbound(&event).await)
        }
        Err(e) => InboundError::Malformed(format!("{:#}", e)).into(),
    };

    print_response(&response)?;
    Ok(response)
}

/// Append one note.
pub async fn note(config: &BridgeConfig, payload: serde_json::Value) -> Result<Response> {
    let response = match serde_json::from_value::<InboundNote>(payload) {
        Ok(note) => {
            let reconciler = config.build_reconciler()?;
            Response::from(reconciler.apply_note(&note).await)
        }
        Err(e) => InboundError::Malformed(e.to_string()).into(),
    };

    print_response(&response)?;
    Ok(response)
}
