// ABOUTME: HTTP client for the polled CRM (System B) REST API
// ABOUTME: Handles cursor pagination, record writes, and custom-field notes

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

use super::models::{self, ListPage};
use super::{dedupe_by_id, RemoteSource};
use crate::mapping;
use crate::model::{EntityKind, InboundFields, Record, SnapshotEntry};

/// Default System B API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.folk.app/v1";

/// System B REST client
pub struct CrmClient {
    client: Client,
    api_base_url: String,
    api_key: String,
    page_size: usize,
}

impl CrmClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `api_base_url` - Optional base URL (defaults to the public API)
    /// * `api_key` - Bearer token
    /// * `timeout` - Bound applied to every request
    pub fn new(
        api_base_url: Option<&str>,
        api_key: String,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url
                .unwrap_or(DEFAULT_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            page_size: page_size.max(1),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    async fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("Failed to {}", what))?;

        let status = response.status();
        tracing::debug!("[CRM API] {}: {}", what, status);

        if status == StatusCode::UNAUTHORIZED {
            anyhow::bail!("CRM API key is invalid or expired (while trying to {})", what);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "CRM API returned error {} while trying to {}: {}",
                status,
                what,
                truncate(&body, 200)
            );
        }

        let value: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse CRM response to {}", what))?;
        Ok(value)
    }

    /// Fetch one page of a listing.
    pub async fn list_page(&self, kind: EntityKind, cursor: Option<&str>) -> Result<ListPage> {
        let url = format!("{}/{}", self.api_base_url, kind.collection());
        let mut request = self
            .client
            .get(&url)
            .query(&[("limit", self.page_size.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let value = self
            .send_json(request, &format!("list {}", kind.collection()))
            .await?;
        serde_json::from_value(value)
            .with_context(|| format!("Unexpected {} listing shape", kind.collection()))
    }

    /// Raw JSON of a single record, `None` on 404.
    async fn get_raw(&self, kind: EntityKind, id: &str) -> Result<Option<Value>> {
        let url = format!("{}/{}/{}", self.api_base_url, kind.collection(), id);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} {}", kind, id))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "CRM API returned error {} fetching {} {}: {}",
                status,
                kind,
                id,
                truncate(&body, 200)
            );
        }

        let value: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} {}", kind, id))?;
        Ok(Some(models::unwrap_envelope(value)))
    }

    async fn patch(&self, kind: EntityKind, id: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}/{}", self.api_base_url, kind.collection(), id);
        self.send_json(
            self.client.patch(&url).json(body),
            &format!("update {} {}", kind, id),
        )
        .await
    }

    async fn create(&self, kind: EntityKind, body: &Value) -> Result<String> {
        let url = format!("{}/{}", self.api_base_url, kind.collection());
        let response = self
            .send_json(self.client.post(&url).json(body), &format!("create {}", kind))
            .await?;
        models::created_id(response)
            .with_context(|| format!("CRM create {} response carried no id", kind))
    }

    /// Raw listing of groups.
    pub async fn list_groups(&self) -> Result<ListPage> {
        let url = format!("{}/groups", self.api_base_url);
        let value = self.send_json(self.client.get(&url), "list groups").await?;
        serde_json::from_value(value).context("Unexpected groups listing shape")
    }
}

#[async_trait]
impl RemoteSource for CrmClient {
    async fn list_all(&self, kind: EntityKind) -> Result<Vec<SnapshotEntry>> {
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            let page = self.list_page(kind, cursor.as_deref()).await?;
            let next = page.next_cursor();
            let values = page.into_values();
            if values.is_empty() {
                break;
            }
            entries.extend(
                values
                    .into_iter()
                    .map(|value| models::normalize_entry(kind, value)),
            );

            match next {
                Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    tracing::warn!(
                        "CRM pagination for {} repeated cursor {}, stopping",
                        kind.collection(),
                        next
                    );
                    break;
                }
                None => break,
            }
        }

        let total = entries.len();
        let entries = dedupe_by_id(entries);
        tracing::info!(
            "Fetched {} {} from CRM ({} duplicates dropped)",
            entries.len(),
            kind.collection(),
            total - entries.len()
        );
        Ok(entries)
    }

    async fn fetch_one(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        let Some(value) = self.get_raw(kind, id).await? else {
            return Ok(None);
        };
        match models::normalize_entry(kind, value) {
            SnapshotEntry::Valid(record) => Ok(Some(record)),
            SnapshotEntry::Malformed { reason } => {
                anyhow::bail!("CRM returned malformed {} {}: {}", kind, id, reason)
            }
        }
    }

    async fn create_or_update(
        &self,
        fields: &InboundFields,
        existing_id: Option<&str>,
    ) -> Result<String> {
        let kind = fields.kind();
        let body = mapping::write_payload(fields);
        match existing_id {
            Some(id) => {
                tracing::info!("[CRM API] Updating {} {}", kind, id);
                self.patch(kind, id, &body).await?;
                Ok(id.to_string())
            }
            None => {
                tracing::info!("[CRM API] Creating {}", kind);
                self.create(kind, &body).await
            }
        }
    }

    async fn notes_group_id(&self) -> Result<Option<String>> {
        Ok(self.list_groups().await?.first_id())
    }

    async fn append_note(
        &self,
        person_id: &str,
        group_id: &str,
        field: &str,
        entry: &str,
    ) -> Result<()> {
        let person = self
            .get_raw(EntityKind::Person, person_id)
            .await?
            .with_context(|| format!("Person {} disappeared before note append", person_id))?;

        let current = models::custom_field_value(&person, group_id, field);
        let updated = mapping::prepend_note(&current, entry);

        tracing::info!(
            "[CRM API] Updating custom field '{}' on person {}",
            field,
            person_id
        );
        self.patch(
            EntityKind::Person,
            person_id,
            &models::custom_field_patch(group_id, field, &updated),
        )
        .await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        match self.list_groups().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("CRM connectivity check failed: {:#}", e);
                false
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CrmClient::new(None, "key".to_string(), 100, Duration::from_secs(30));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = CrmClient::new(
            Some("https://crm.example.com/v1/"),
            "key".to_string(),
            0,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.api_base_url, "https://crm.example.com/v1");
        assert_eq!(client.page_size, 1);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
