//! Shared reqwest plumbing for the HTTP service clients.

use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::error::ServiceError;

/// Longest error body kept in [`ServiceError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// Client with a per-request timeout. Falls back to a default client if the
/// builder fails.
pub(crate) fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Join a base URL and a path without doubling or dropping the `/`.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Pass 2xx responses through; map everything else to a [`ServiceError`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(ServiceError::Unavailable);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Decode a JSON body; decoding problems are [`ServiceError::Malformed`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Resource id the server expects in `/audio/{id}` and `/video/{id}`: an
/// explicit id wins, otherwise the file name of the server-side path.
pub(crate) fn resource_id(
    id: Option<String>,
    path: Option<String>,
) -> Result<String, ServiceError> {
    if let Some(id) = id.filter(|id| !id.trim().is_empty()) {
        return Ok(id);
    }
    path.as_deref()
        .and_then(|p| Path::new(p).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Malformed("response carries neither id nor path".into()))
}
