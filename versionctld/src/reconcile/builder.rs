use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use shared::types::{ReconciliationEntry, Snapshot};
use crate::prober::ProbeResult;
use super::classify::classify;
use super::correlate::Correlation;

/// environment -> runtime service name -> probe results for its endpoints
pub type Observed = BTreeMap<String, BTreeMap<String, Vec<ProbeResult>>>;

/// Assemble a snapshot in one pass over the correlation, classifying each
/// bucket from the probe results of the services folded into it.
pub fn build_snapshot(
    captured_at: DateTime<Utc>,
    correlation: Correlation,
    observed: &Observed,
) -> Snapshot {
    let entries = correlation
        .into_iter()
        .map(|(environment, buckets)| {
            let probes = observed.get(&environment);
            let services = buckets
                .into_iter()
                .map(|(name, bucket)| {
                    let mut observed_versions = BTreeMap::new();
                    let results = bucket
                        .matched_services
                        .iter()
                        .filter_map(|service| probes.and_then(|p| p.get(service)))
                        .flatten();
                    for result in results {
                        let key = result.endpoint.to_string();
                        if let Some(previous) = observed_versions.insert(key, result.observation.clone()) {
                            tracing::debug!(
                                "{} in {} lists {} more than once, keeping the last observation (was {})",
                                name,
                                environment,
                                result.endpoint,
                                previous.marker()
                            );
                        }
                    }

                    let status = classify(
                        bucket.declared_version.as_deref(),
                        observed_versions.values(),
                    );

                    let entry = ReconciliationEntry {
                        environment: environment.clone(),
                        service_name: bucket.service_name,
                        declared_version: bucket.declared_version,
                        matched_services: bucket.matched_services,
                        observed_versions,
                        status,
                    };
                    (name, entry)
                })
                .collect();
            (environment, services)
        })
        .collect();

    Snapshot { captured_at, entries }
}
