// ABOUTME: Bridge configuration - optional TOML file, then environment overrides
// ABOUTME: Builds the reconciler with its HTTP adapters and state store

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::remote::client::DEFAULT_API_BASE_URL;
use crate::remote::webhook::WebhookUrls;
use crate::remote::{CrmClient, WebhookSink};
use crate::sync::{FileStateStore, LookupMissPolicy, ReconcileConfig, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub api_key: String,
    pub page_size: usize,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            page_size: 100,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub person_new_url: Option<String>,
    pub person_update_url: Option<String>,
    pub company_new_url: Option<String>,
    pub company_update_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            person_new_url: None,
            person_update_url: None,
            company_new_url: None,
            company_update_url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: FileStateStore::default_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub lookup_miss: LookupMissPolicy,
    pub notes_field: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let defaults = ReconcileConfig::default();
        Self {
            lookup_miss: defaults.lookup_miss,
            notes_field: defaults.notes_field,
        }
    }
}

/// Full bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub state: StateConfig,
    pub sync: SyncSettings,
}

impl BridgeConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                Self::from_toml_str(&contents)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Override settings from environment variables (empty values are ignored).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CRM_BASE_URL") {
            self.source.base_url = v;
        }
        if let Some(v) = get("CRM_API_KEY") {
            self.source.api_key = v;
        }
        if let Some(v) = get("PERSON_NEW_WEBHOOK_URL") {
            self.sink.person_new_url = Some(v);
        }
        if let Some(v) = get("PERSON_UPDATE_WEBHOOK_URL") {
            self.sink.person_update_url = Some(v);
        }
        if let Some(v) = get("COMPANY_NEW_WEBHOOK_URL") {
            self.sink.company_new_url = Some(v);
        }
        if let Some(v) = get("COMPANY_UPDATE_WEBHOOK_URL") {
            self.sink.company_update_url = Some(v);
        }
        if let Some(v) = get("STATE_FILE") {
            self.state.path = PathBuf::from(v);
        }
        if let Some(v) = get("LOOKUP_MISS_POLICY") {
            self.sync.lookup_miss = v.parse().context("Invalid LOOKUP_MISS_POLICY")?;
        }
        if let Some(v) = get("NOTES_FIELD") {
            self.sync.notes_field = v;
        }
        Ok(())
    }

    /// Check URLs and numeric bounds.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.source.base_url)
            .with_context(|| format!("Invalid CRM base URL '{}'", self.source.base_url))?;

        for (name, value) in [
            ("person_new_url", &self.sink.person_new_url),
            ("person_update_url", &self.sink.person_update_url),
            ("company_new_url", &self.sink.company_new_url),
            ("company_update_url", &self.sink.company_update_url),
        ] {
            if let Some(value) = value {
                url::Url::parse(value)
                    .with_context(|| format!("Invalid webhook URL for {}", name))?;
            }
        }

        if self.source.timeout_secs == 0 || self.sink.timeout_secs == 0 {
            bail!("Timeouts must be at least one second");
        }
        if self.sync.notes_field.trim().is_empty() {
            bail!("Notes field name must not be empty");
        }
        Ok(())
    }

    pub fn webhook_urls(&self) -> WebhookUrls {
        WebhookUrls {
            person_new: self.sink.person_new_url.clone(),
            person_update: self.sink.person_update_url.clone(),
            company_new: self.sink.company_new_url.clone(),
            company_update: self.sink.company_update_url.clone(),
        }
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            lookup_miss: self.sync.lookup_miss,
            notes_field: self.sync.notes_field.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.source.api_key.trim().is_empty()
    }

    pub fn crm_client(&self) -> Result<CrmClient> {
        CrmClient::new(
            Some(&self.source.base_url),
            self.source.api_key.clone(),
            self.source.page_size,
            Duration::from_secs(self.source.timeout_secs),
        )
    }

    pub fn webhook_sink(&self) -> Result<WebhookSink> {
        WebhookSink::new(
            self.webhook_urls(),
            Duration::from_secs(self.sink.timeout_secs),
        )
    }

    pub fn state_store(&self) -> FileStateStore {
        FileStateStore::new(self.state.path.clone())
    }

    /// Wire the HTTP adapters and file store into a reconciler.
    pub fn build_reconciler(&self) -> Result<Reconciler> {
        Ok(Reconciler::new(
            Arc::new(self.state_store()),
            Arc::new(self.crm_client()?),
            Arc::new(self.webhook_sink()?),
            self.reconcile_config(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.source.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.source.page_size, 100);
        assert_eq!(config.sink.timeout_secs, 30);
        assert_eq!(config.state.path, FileStateStore::default_path());
        assert_eq!(config.sync.lookup_miss, LookupMissPolicy::Create);
        assert!(!config.has_api_key());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [source]
            api_key = "secret"

            [sink]
            person_new_url = "https://hooks.example.com/p/new"

            [sync]
            lookup_miss = "fail"
            "#,
        )
        .unwrap();

        assert_eq!(config.source.api_key, "secret");
        assert_eq!(config.source.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(
            config.sink.person_new_url.as_deref(),
            Some("https://hooks.example.com/p/new")
        );
        assert!(config.sink.company_new_url.is_none());
        assert_eq!(config.sync.lookup_miss, LookupMissPolicy::Fail);
        assert_eq!(config.sync.notes_field, "Synced Notes");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CRM_API_KEY", "from-env"),
            ("COMPANY_UPDATE_WEBHOOK_URL", "https://hooks.example.com/c/upd"),
            ("STATE_FILE", "/tmp/bridge/state.json"),
            ("LOOKUP_MISS_POLICY", "fail"),
            ("NOTES_FIELD", ""),
        ]);

        let mut config = BridgeConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.source.api_key, "from-env");
        assert_eq!(
            config.webhook_urls().company_update.as_deref(),
            Some("https://hooks.example.com/c/upd")
        );
        assert_eq!(config.state.path, PathBuf::from("/tmp/bridge/state.json"));
        assert_eq!(config.sync.lookup_miss, LookupMissPolicy::Fail);
        // Empty values do not override
        assert_eq!(config.sync.notes_field, "Synced Notes");
    }

    #[test]
    fn test_invalid_policy_in_env() {
        let mut config = BridgeConfig::default();
        let result = config.apply_env(|key| {
            (key == "LOOKUP_MISS_POLICY").then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = BridgeConfig::default();
        config.sink.person_update_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.source.base_url = "::".to_string();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.sink.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_reconciler() {
        let config = BridgeConfig::default();
        let reconciler = config.build_reconciler().unwrap();
        assert_eq!(reconciler.config().notes_field, "Synced Notes");
    }
}
