//! HTTP-backed cloud save store.
//!
//! Talks JSON (the wire save shape) to a remote endpoint:
//! `GET/PUT {base_url}/v1/saves/{user}/{game}/{slot}`.

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{CloudSaveStore, RemoteLimits};
use crate::error::{Error, Result};
use crate::export::WireSave;
use crate::models::SaveRecord;

/// Remote save store over HTTP.
#[derive(Clone)]
pub struct HttpCloudStore {
    base_url: String,
    client: reqwest::Client,
    limits: RemoteLimits,
    auth_token: Option<String>,
}

impl HttpCloudStore {
    /// Build a store against the given base URL.
    pub fn new(base_url: impl Into<String>, limits: RemoteLimits) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Sync(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            client,
            limits,
            auth_token: None,
        })
    }

    /// Attach a bearer token sent with every request.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn record_url(&self, user_id: &str, game_id: &str, slot_name: &str) -> String {
        format!(
            "{}/v1/saves/{user_id}/{game_id}/{slot_name}",
            self.base_url
        )
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CloudSaveStore for HttpCloudStore {
    async fn fetch(
        &self,
        user_id: &str,
        game_id: &str,
        slot_name: &str,
    ) -> Result<Option<SaveRecord>> {
        let request = self
            .client
            .get(self.record_url(user_id, game_id, slot_name))
            .header(reqwest::header::ACCEPT, "application/json");

        let response = self
            .apply_auth(request)
            .send()
            .await
            .map_err(|error| Error::Sync(format!("remote fetch failed: {error}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let wire = response
                    .json::<WireSave>()
                    .await
                    .map_err(|error| Error::Sync(format!("invalid remote save payload: {error}")))?;
                Ok(Some(wire.into_record()?))
            }
            status => Err(remote_status_error("fetch", status, response).await),
        }
    }

    async fn put(&self, record: &SaveRecord) -> Result<()> {
        if record.payload.len() > self.limits.max_payload_bytes {
            return Err(Error::SizeExceeded {
                size_bytes: record.payload.len(),
                limit_bytes: self.limits.max_payload_bytes,
            });
        }

        let wire = WireSave::from_record(record);
        let request = self
            .client
            .put(self.record_url(&record.user_id, &record.game_id, &record.slot_name))
            .json(&wire);

        let response = self
            .apply_auth(request)
            .send()
            .await
            .map_err(|error| Error::Sync(format!("remote upload failed: {error}")))?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(Error::SizeExceeded {
                size_bytes: record.payload.len(),
                limit_bytes: self.limits.max_payload_bytes,
            });
        }
        if !status.is_success() {
            return Err(remote_status_error("upload", status, response).await);
        }

        Ok(())
    }
}

async fn remote_status_error(
    operation: &str,
    status: StatusCode,
    response: reqwest::Response,
) -> Error {
    let body = response.text().await.unwrap_or_default();
    Error::Sync(format!(
        "remote {operation} returned HTTP {}: {}",
        status.as_u16(),
        compact_text(&body)
    ))
}

/// Truncate response bodies so error messages stay readable.
fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

fn normalize_base_url(raw: String) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "remote base URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote base URL must include http:// or https://".to_string(),
        ))
    }
}
