// ABOUTME: Status command - reports service identity and configuration health
// ABOUTME: Checks which webhook channels are configured and whether System B is reachable

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::BridgeConfig;
use crate::model::{ChangeKind, Channel, EntityKind};
use crate::remote::{RemoteSink, RemoteSource};

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub service: &'static str,
    pub version: &'static str,
    pub crm_api_key_configured: bool,
    /// None when no API key is configured
    pub crm_reachable: Option<bool>,
    pub webhooks: BTreeMap<String, bool>,
    pub notes_field: String,
    pub lookup_miss: String,
    pub state_file: String,
}

pub async fn status(config: &BridgeConfig) -> Result<StatusReport> {
    let sink = config.webhook_sink()?;
    let mut webhooks = BTreeMap::new();
    for kind in EntityKind::ALL {
        for change in [ChangeKind::New, ChangeKind::Update] {
            let channel = Channel::new(kind, change);
            webhooks.insert(channel.to_string(), sink.is_configured(channel));
        }
    }

    let crm_reachable = if config.has_api_key() {
        Some(config.crm_client()?.ping().await)
    } else {
        tracing::warn!("CRM_API_KEY is not set; skipping reachability check");
        None
    };

    let report = StatusReport {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        crm_api_key_configured: config.has_api_key(),
        crm_reachable,
        webhooks,
        notes_field: config.sync.notes_field.clone(),
        lookup_miss: format!("{:?}", config.sync.lookup_miss).to_lowercase(),
        state_file: config.state.path.display().to_string(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}
