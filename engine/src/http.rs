//! HTTP transport for the remote of record.

use crate::{
    error::Result, Credential, EngineConfig, EntityKind, Error, Record, RemoteSnapshot,
    RemoteStore, SyncPayload, TransportError, UploadReceipt,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Error body produced by the remote.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// [`RemoteStore`] over HTTP.
///
/// Uploads go to `POST {base}/sync`, snapshots come from
/// `POST {base}/sync/download`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a transport whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a transport from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let base_url = config
            .api_url
            .as_deref()
            .ok_or_else(|| Error::Config("DAYBOOK_API_URL is not set".into()))?;
        Self::new(base_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        credential: &Credential,
    ) -> std::result::Result<T, TransportError>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "sending sync request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credential.token)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::network(sanitize(&e)))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|e| {
            TransportError::status(status, format!("invalid response body: {}", sanitize(&e)))
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn upload_payload(
        &self,
        payload: &SyncPayload,
        credential: &Credential,
    ) -> std::result::Result<UploadReceipt, TransportError> {
        self.post("/sync", payload, credential).await
    }

    async fn download_snapshot(
        &self,
        credential: &Credential,
    ) -> std::result::Result<RemoteSnapshot, TransportError> {
        let body: serde_json::Map<String, serde_json::Value> = self
            .post("/sync/download", &serde_json::json!({}), credential)
            .await?;
        Ok(snapshot_from_body(body))
    }
}

/// Decode a snapshot one record at a time.
///
/// Unknown kinds and records that do not parse are logged and skipped so one
/// bad row cannot block the rest of the download.
fn snapshot_from_body(body: serde_json::Map<String, serde_json::Value>) -> RemoteSnapshot {
    let mut snapshot = RemoteSnapshot::new();

    for (key, value) in body {
        let kind: EntityKind = match key.parse() {
            Ok(kind) => kind,
            Err(_) => {
                tracing::warn!(kind = %key, "ignoring unknown kind in snapshot");
                continue;
            }
        };
        let serde_json::Value::Array(values) = value else {
            tracing::warn!(%kind, "snapshot collection is not an array, skipping");
            continue;
        };

        let mut records = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<Record>(value) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(%kind, index, error = %e, "skipping undecodable record"),
            }
        }
        snapshot.insert(kind, records);
    }

    snapshot
}

async fn error_from_response(response: Response) -> TransportError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    error_from_body(status.as_u16(), status.canonical_reason(), &text)
}

fn error_from_body(status: u16, reason: Option<&str>, text: &str) -> TransportError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => {
            let error = TransportError::status(status, body.error);
            match body.details {
                Some(details) => error.with_detail(details),
                None => error,
            }
        }
        Err(_) => {
            let compact: String = text.trim().chars().take(180).collect();
            let message = if compact.is_empty() {
                reason.unwrap_or("request failed").to_string()
            } else {
                compact
            };
            TransportError::status(status, message)
        }
    }
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}
