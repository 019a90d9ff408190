use std::collections::{BTreeMap, BTreeSet};
use chrono::Utc;
use futures::future::join_all;
use anyhow::Result;
use shared::types::Snapshot;
use crate::config::{Config, EnvironmentConfig};
use crate::prober::{ProbeResult, Prober};
use crate::reconcile::builder::{build_snapshot, Observed};
use crate::reconcile::correlate::Correlator;
use crate::sources::http_client;
use crate::sources::registry::{RegistryClient, RegistryEntry};
use crate::sources::version_source::{DeclaredVersionMap, VersionSource};

/// One refresh cycle end to end: fetch, probe, correlate, classify, build.
pub struct Pipeline {
    source: VersionSource,
    registry: RegistryClient,
    prober: Prober,
    correlator: Correlator,
    environments: Vec<EnvironmentConfig>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client()?;
        Ok(Self {
            source: VersionSource::new(client.clone(), config.source.url.clone()),
            registry: RegistryClient::new(client),
            prober: Prober::new(
                config.refresh.probe_timeout(),
                config.refresh.max_concurrent_probes,
            )?,
            correlator: Correlator::new(&config.environments, config.aliases.clone()),
            environments: config.environments.clone(),
        })
    }

    /// Run a full cycle. Collaborator failures degrade the affected part of
    /// the snapshot instead of failing the cycle.
    pub async fn run_cycle(&self) -> Snapshot {
        let (declared, registries) = tokio::join!(
            self.fetch_declared(),
            join_all(self.environments.iter().map(|env| self.registry.fetch_environment(env))),
        );

        let probed = join_all(
            self.environments
                .iter()
                .zip(registries)
                .map(|(env, entries)| self.probe_environment(env, entries)),
        )
        .await;

        let mut running = BTreeMap::new();
        let mut observed = Observed::new();
        for (env, services) in probed {
            running.insert(env.clone(), services.keys().cloned().collect::<BTreeSet<_>>());
            observed.insert(env, services);
        }

        let correlation = self.correlator.correlate(&declared, &running);
        build_snapshot(Utc::now(), correlation, &observed)
    }

    async fn fetch_declared(&self) -> DeclaredVersionMap {
        match self.source.fetch().await {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!("Continuing without declared versions: {}", e);
                DeclaredVersionMap::new()
            }
        }
    }

    async fn probe_environment(
        &self,
        env: &EnvironmentConfig,
        entries: Vec<RegistryEntry>,
    ) -> (String, BTreeMap<String, Vec<ProbeResult>>) {
        let services = join_all(entries.into_iter().map(|entry| async move {
            tracing::debug!(
                "Probing {} endpoints of {} in {}",
                entry.endpoints.len(),
                entry.service_name,
                entry.environment
            );
            let results = self.prober.probe_all(entry.endpoints).await;
            (entry.service_name, results)
        }))
        .await;

        let unreachable = services
            .iter()
            .flat_map(|(_, results)| results)
            .filter(|r| !r.reachable())
            .count();
        if unreachable > 0 {
            tracing::debug!("{} endpoints unreachable in {}", unreachable, env.name);
        }

        (env.name.clone(), services.into_iter().collect())
    }
}
