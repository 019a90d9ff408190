pub mod registry;
pub mod version_source;

use std::time::Duration;
use reqwest::Client;
use serde::de::DeserializeOwned;
use crate::error::{ReconcileError, Result};

/// Upper bound on a single version-source or registry request
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by the collaborator clients
pub fn http_client() -> anyhow::Result<Client> {
    let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
    Ok(client)
}

/// GET `url` and decode its body as `T`.
///
/// Transport errors and non-success statuses map to `SourceUnavailable`; a body
/// that does not decode as `T` maps to `MalformedResponse`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let body = client
        .get(url)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(|e| ReconcileError::unavailable(url, e))?
        .bytes()
        .await
        .map_err(|e| ReconcileError::unavailable(url, e))?;

    serde_json::from_slice(&body).map_err(|e| ReconcileError::malformed(url, e))
}
