use std::collections::BTreeMap;
use futures::future::join_all;
use reqwest::Client;
use shared::types::Endpoint;
use crate::config::EnvironmentConfig;
use crate::error::Result;
use super::fetch_json;

/// Registry payload: group -> service name -> address strings
type RegistryDocument = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Services reported by one mirror, keyed by service name
pub type ServiceEndpoints = BTreeMap<String, Vec<Endpoint>>;

/// A running service as reported by an environment's registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub environment: String,
    pub service_name: String,
    pub endpoints: Vec<Endpoint>,
}

/// Client for the runtime service registries
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
}

impl RegistryClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch a single mirror. Blank service names, and address strings that
    /// are neither a single address nor a `service management` pair, are
    /// dropped with a warning.
    pub async fn fetch_mirror(&self, url: &str) -> Result<ServiceEndpoints> {
        let document: RegistryDocument = fetch_json(&self.client, url).await?;

        let mut services = ServiceEndpoints::new();
        for group in document.into_values() {
            for (name, addresses) in group {
                if name.trim().is_empty() {
                    tracing::warn!("Ignoring unnamed service with {} addresses from {}", addresses.len(), url);
                    continue;
                }
                let endpoints = addresses
                    .iter()
                    .filter_map(|raw| {
                        let parsed = Endpoint::parse(raw);
                        if parsed.is_none() {
                            tracing::warn!("Ignoring address {:?} for {} from {}", raw, name, url);
                        }
                        parsed
                    })
                    .collect();
                services.insert(name, endpoints);
            }
        }

        Ok(services)
    }

    /// Fetch every mirror of an environment concurrently and merge them.
    ///
    /// A failing mirror is logged and skipped; if every mirror fails the
    /// environment simply reports no services.
    pub async fn fetch_environment(&self, env: &EnvironmentConfig) -> Vec<RegistryEntry> {
        let results = join_all(env.registry_urls.iter().map(|url| self.fetch_mirror(url))).await;

        let mut mirrors = Vec::with_capacity(results.len());
        for (url, result) in env.registry_urls.iter().zip(results) {
            match result {
                Ok(services) => mirrors.push(services),
                Err(e) => tracing::warn!("Registry mirror {} for {} failed: {}", url, env.name, e),
            }
        }

        if mirrors.is_empty() {
            tracing::warn!("No registry mirror answered for {}", env.name);
        }

        let entries = merge_mirrors(&env.name, mirrors);
        tracing::debug!("Registry for {} lists {} services", env.name, entries.len());
        entries
    }
}

/// Union mirrors on service name. Mirrors are applied in configured order, so
/// the last mirror listing a service decides its endpoints.
pub fn merge_mirrors(
    environment: &str,
    mirrors: impl IntoIterator<Item = ServiceEndpoints>,
) -> Vec<RegistryEntry> {
    let mut merged = ServiceEndpoints::new();
    for mirror in mirrors {
        merged.extend(mirror);
    }

    merged
        .into_iter()
        .map(|(service_name, endpoints)| RegistryEntry {
            environment: environment.to_string(),
            service_name,
            endpoints,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use crate::error::ReconcileError;
    use crate::test_support::{closed_port, serve};

    fn single(addr: &str) -> Endpoint {
        Endpoint::Single(addr.to_string())
    }

    #[test]
    fn test_merge_is_union_with_last_writer_wins() {
        let first = ServiceEndpoints::from([
            ("foo".to_string(), vec![single("10.0.0.1:80")]),
            ("bar".to_string(), vec![single("10.0.0.2:80")]),
        ]);
        let second = ServiceEndpoints::from([
            ("foo".to_string(), vec![single("10.0.0.9:80")]),
            ("baz".to_string(), vec![single("10.0.0.3:80")]),
        ]);

        let merged = merge_mirrors("qa", [first, second]);
        let names: Vec<_> = merged.iter().map(|e| e.service_name.as_str()).collect();
        assert_eq!(names, ["bar", "baz", "foo"]);

        let foo = merged.iter().find(|e| e.service_name == "foo").unwrap();
        assert_eq!(foo.endpoints, vec![single("10.0.0.9:80")]);
        assert!(merged.iter().all(|e| e.environment == "qa"));
    }

    #[tokio::test]
    async fn test_fetch_mirror_parses_pairs() {
        let app = Router::new().route(
            "/services",
            get(|| async {
                Json(json!({
                    "services": {
                        "foo-api": ["10.0.3.5:8080 10.0.3.5:8081", "10.0.3.6:8080"],
                        "bar": ["10.0.3.7:8080 10.0.3.7:8081 extra"]
                    }
                }))
            }),
        );
        let addr = serve(app).await;
        let registry = RegistryClient::new(Client::new());

        let services = registry
            .fetch_mirror(&format!("http://{}/services", addr))
            .await
            .unwrap();

        assert_eq!(services["foo-api"].len(), 2);
        assert_eq!(services["foo-api"][0].probe_address(), "10.0.3.5:8081");
        assert!(services["bar"].is_empty());
    }

    #[tokio::test]
    async fn test_fetch_mirror_drops_blank_names() {
        let app = Router::new().route(
            "/services",
            get(|| async {
                Json(json!({
                    "services": {
                        "": ["10.0.3.5:8080"],
                        "  ": ["10.0.3.6:8080"],
                        "foo": ["10.0.3.7:8080"]
                    }
                }))
            }),
        );
        let addr = serve(app).await;
        let registry = RegistryClient::new(Client::new());

        let services = registry
            .fetch_mirror(&format!("http://{}/services", addr))
            .await
            .unwrap();

        assert_eq!(services.keys().collect::<Vec<_>>(), ["foo"]);
    }

    #[tokio::test]
    async fn test_fetch_mirror_rejects_wrong_shape() {
        let app = Router::new().route(
            "/services",
            get(|| async { Json(json!({"services": ["foo", "bar"]})) }),
        );
        let addr = serve(app).await;
        let registry = RegistryClient::new(Client::new());

        let err = registry
            .fetch_mirror(&format!("http://{}/services", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedResponse { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_environment_skips_failed_mirror() {
        let app = Router::new().route(
            "/services",
            get(|| async { Json(json!({"services": {"foo": ["10.0.3.5:8080"]}})) }),
        );
        let live = serve(app).await;
        let dead = closed_port().await;

        let env = EnvironmentConfig {
            name: "qa".to_string(),
            registry_urls: vec![
                format!("http://{}/services", dead),
                format!("http://{}/services", live),
            ],
            suffix: None,
        };
        let registry = RegistryClient::new(Client::new());

        let entries = registry.fetch_environment(&env).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service_name, "foo");
    }

    #[tokio::test]
    async fn test_fetch_environment_skips_malformed_mirror() {
        let broken = serve(Router::new().route(
            "/services",
            get(|| async { Json(json!({"services": "not a service table"})) }),
        ))
        .await;
        let healthy = serve(Router::new().route(
            "/services",
            get(|| async { Json(json!({"services": {"bar": ["10.0.3.8:8080"]}})) }),
        ))
        .await;

        let env = EnvironmentConfig {
            name: "qa".to_string(),
            registry_urls: vec![
                format!("http://{}/services", healthy),
                format!("http://{}/services", broken),
            ],
            suffix: None,
        };
        let registry = RegistryClient::new(Client::new());

        let entries = registry.fetch_environment(&env).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service_name, "bar");
        assert_eq!(entries[0].endpoints, vec![single("10.0.3.8:8080")]);
    }

    #[tokio::test]
    async fn test_fetch_environment_all_mirrors_down() {
        let dead = closed_port().await;
        let env = EnvironmentConfig {
            name: "production".to_string(),
            registry_urls: vec![format!("http://{}/services", dead)],
            suffix: None,
        };
        let registry = RegistryClient::new(Client::new());

        assert!(registry.fetch_environment(&env).await.is_empty());
    }
}
