use std::collections::BTreeMap;
use reqwest::Client;
use crate::error::Result;
use super::fetch_json;

/// Declared key (`<service-base>_<environment-suffix>`) -> version of record
pub type DeclaredVersionMap = BTreeMap<String, String>;

/// Client for the configuration authority's version listing
#[derive(Clone)]
pub struct VersionSource {
    client: Client,
    url: String,
}

impl VersionSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Fetch the declared versions. The payload must be a flat object of
    /// string values; anything else is a `MalformedResponse`.
    pub async fn fetch(&self) -> Result<DeclaredVersionMap> {
        let versions: DeclaredVersionMap = fetch_json(&self.client, &self.url).await?;
        tracing::debug!("Fetched {} declared versions from {}", versions.len(), self.url);
        Ok(versions)
    }
}
