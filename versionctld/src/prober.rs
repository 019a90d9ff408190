use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use shared::protocol::INFO_PATH;
use shared::types::{Endpoint, Observation};

/// Outcome of probing one endpoint. Failures are carried as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub endpoint: Endpoint,
    pub observation: Observation,
}

impl ProbeResult {
    pub fn reachable(&self) -> bool {
        self.observation.is_reachable()
    }
}

/// One nested object of an info document. Only `version` is read; it must be
/// a string when present.
#[derive(Debug, Deserialize)]
struct InfoSection {
    #[serde(default)]
    version: Option<String>,
}

/// `GET /info` payload: section name -> section object
type InfoDocument = BTreeMap<String, InfoSection>;

/// Queries running instances for their version, with a per-endpoint timeout
/// and a cap on probes in flight shared by every caller.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl Prober {
    pub fn new(timeout: Duration, max_concurrent: usize) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            timeout,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        })
    }

    /// Probe one endpoint. Waiting for a permit does not count against the
    /// timeout; the request and body read do.
    pub async fn probe(&self, endpoint: Endpoint) -> ProbeResult {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return ProbeResult {
                    endpoint,
                    observation: Observation::Unreachable { reason: e.to_string() },
                }
            }
        };

        let url = format!("http://{}{}", endpoint.probe_address(), INFO_PATH);
        tracing::debug!("Probing {}", url);

        let observation = match tokio::time::timeout(self.timeout, self.query(&url)).await {
            Ok(observation) => observation,
            Err(_) => Observation::Unreachable {
                reason: format!("timeout after {}ms", self.timeout.as_millis()),
            },
        };

        if !observation.is_reachable() {
            tracing::debug!("Probe of {} failed: {}", url, observation.marker());
        }

        ProbeResult { endpoint, observation }
    }

    /// Probe every endpoint concurrently, bounded by the shared permit pool.
    /// Results come back in input order.
    pub async fn probe_all(&self, endpoints: Vec<Endpoint>) -> Vec<ProbeResult> {
        join_all(endpoints.into_iter().map(|endpoint| self.probe(endpoint))).await
    }

    async fn query(&self, url: &str) -> Observation {
        let unreachable = |reason: String| Observation::Unreachable { reason };

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return unreachable(format!("connection error: {}", e)),
        };

        let status = resp.status();
        if !status.is_success() {
            return unreachable(format!("HTTP status {}", status));
        }

        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => return unreachable(format!("connection error: {}", e)),
        };

        match serde_json::from_slice::<InfoDocument>(&body) {
            Ok(document) => select_version(&document),
            Err(e) => unreachable(format!("unparsable body: {}", e)),
        }
    }
}

/// Pick the version out of an info document. Several sections naming the same
/// version are fine; sections that disagree make the answer ambiguous.
fn select_version(document: &InfoDocument) -> Observation {
    let mut versions: Vec<&str> = document
        .values()
        .filter_map(|section| section.version.as_deref())
        .collect();
    versions.sort_unstable();
    versions.dedup();

    match versions.as_slice() {
        [] => Observation::Unverified {
            reason: "no version in info document".to_string(),
        },
        [version] => Observation::Version {
            version: version.to_string(),
        },
        many => Observation::Unverified {
            reason: format!("ambiguous version: {}", many.join(", ")),
        },
    }
}
