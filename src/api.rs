//! Typed HTTP client for the item API.
//!
//! This is the client half of the system: the management commands and the
//! save-retry loop talk to the server exclusively through [`ApiClient`],
//! which maps HTTP outcomes onto the gateway error taxonomy. Version
//! conflicts are recognized by the server's `version_conflict` error code
//! (or a bare 409); nothing else is ever treated as retryable.
//!
//! Requests carry a hard timeout (`[api].timeout_secs`, default 10 s);
//! expiry surfaces as a transport failure, not a conflict.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::models::{Item, ValidatedItem};
use crate::retry::{GatewayError, RecordGateway};

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

/// Response body of `DELETE /api/items/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub message: String,
    pub deleted_item: Item,
}

/// Error body shared by every API failure response.
#[derive(Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Deserialize)]
struct WireErrorDetail {
    code: String,
    message: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_items(&self) -> Result<Vec<Item>, GatewayError> {
        let response = self
            .http
            .get(self.url("/api/items"))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    pub async fn get_item(&self, id: &str) -> Result<Item, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/api/items/{}", id)))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    pub async fn add_item(&self, fields: &ValidatedItem) -> Result<Item, GatewayError> {
        let response = self
            .http
            .post(self.url("/api/items/add"))
            .json(fields)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    pub async fn delete_item(&self, id: &str) -> Result<DeleteOutcome, GatewayError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/items/{}", id)))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

#[async_trait::async_trait]
impl RecordGateway for ApiClient {
    async fn fetch(&self, id: &str) -> Result<Item, GatewayError> {
        self.get_item(id).await
    }

    async fn replace(&self, candidate: &Item) -> Result<Item, GatewayError> {
        let response = self
            .http
            .put(self.url(&format!("/api/items/update/{}", candidate.id)))
            .json(candidate)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(e: reqwest::Error) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

/// Decodes a successful body, or classifies the error response.
async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();

    if status.is_success() {
        return response.json::<T>().await.map_err(transport);
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<WireError>(&text).ok().map(|w| w.error);

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GatewayError::NotFound);
    }
    if status == reqwest::StatusCode::CONFLICT
        || detail.as_ref().is_some_and(|d| d.code == "version_conflict")
    {
        return Err(GatewayError::Conflict);
    }

    let message = detail
        .map(|d| d.message)
        .unwrap_or_else(|| format!("HTTP {}: {}", status, text));
    Err(GatewayError::Rejected(message))
}
