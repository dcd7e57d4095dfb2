//! PostgREST client for the remote tables.

use super::{RemoteError, RemoteStore};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use sitesync_engine::{
    sanitize::canonical_id, EntityKind, Record, RecordId, RemoteRow, SyncCheckpoint,
};
use std::collections::BTreeSet;
use std::time::Duration;

/// Remote store speaking the PostgREST dialect (`/rest/v1/{table}`).
#[derive(Clone)]
pub struct PostgrestRemote {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for PostgrestRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestRemote")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl PostgrestRemote {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn table_url(&self, kind: EntityKind) -> String {
        format!("{}/rest/v1/{}", self.base_url, kind.table())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }

    async fn select(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
        tombstones: bool,
    ) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .authorized(self.client.get(self.table_url(kind)))
            .query(&select_query(since, tombstones))
            .send()
            .await?;

        let payload = ensure_success(response).await?.json::<Value>().await?;
        match payload {
            Value::Array(rows) => Ok(rows),
            other => Err(RemoteError::InvalidPayload(format!(
                "expected an array of rows from {}, got {}",
                kind.table(),
                other
            ))),
        }
    }
}

/// Query string of a pull request.
fn select_query(since: SyncCheckpoint, tombstones: bool) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", if tombstones { "id" } else { "*" }.to_string()),
        (
            "deleted_at",
            if tombstones { "not.is.null" } else { "is.null" }.to_string(),
        ),
    ];
    if let Some(since) = since.to_persisted() {
        query.push(("updated_at", format!("gt.{since}")));
    }
    query.push(("order", "updated_at.desc".to_string()));
    query
}

/// Union of the keys of a batch. PostgREST requires every object of a bulk
/// insert to have the same keys unless the columns are named.
fn batch_columns(rows: &[RemoteRow]) -> String {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    columns.into_iter().collect::<Vec<_>>().join(",")
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for PostgrestRemote {
    async fn fetch_live(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
    ) -> Result<Vec<Record>, RemoteError> {
        self.select(kind, since, false)
            .await?
            .into_iter()
            .map(|row| {
                Record::from_value(row)
                    .map_err(|err| RemoteError::InvalidPayload(format!("{}: {err}", kind.table())))
            })
            .collect()
    }

    async fn fetch_tombstones(
        &self,
        kind: EntityKind,
        since: SyncCheckpoint,
    ) -> Result<Vec<RecordId>, RemoteError> {
        let rows = self.select(kind, since, true).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("id").and_then(canonical_id))
            .collect())
    }

    async fn upsert(&self, kind: EntityKind, rows: &[RemoteRow]) -> Result<(), RemoteError> {
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .authorized(self.client.post(self.table_url(kind)))
            .query(&[("on_conflict", "id".to_string()), ("columns", batch_columns(rows))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}
