use crate::error::ProviderError;

use base64::{engine, Engine};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;

/// ISO-8601 UTC timestamp with millisecond precision, the format every event record carries.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Unpadded base64url, as the Gmail `raw` field expects.
pub fn b64url_encode(bytes: &[u8]) -> String {
    engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Send a prepared request and turn transport failures and non-2xx statuses into a
/// `ProviderError` tagged with `service`.
pub async fn send_checked(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let resp = request
        .send()
        .await
        .map_err(|source| ProviderError::Transport { service, source })?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Like `send_checked`, then decode the JSON body.
pub async fn send_json<T: DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let resp = send_checked(service, request).await?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|source| ProviderError::Transport { service, source })?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode {
        service,
        reason: e.to_string(),
    })
}
