use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::default_suffix;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub refresh: RefreshConfig,
    pub source: SourceConfig,
    pub environments: Vec<EnvironmentConfig>,
    /// Explicit declared base name -> runtime service names
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    /// Equivalent registry mirrors, merged in order
    pub registry_urls: Vec<String>,
    /// Suffix identifying this environment in declared keys; `_<name>` if unset
    #[serde(default)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_interval() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_max_concurrent_probes() -> usize {
    16
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/versionctl/snapshot.db")
}

fn default_listen() -> String {
    "[::]:9000".to_string()
}

fn default_title() -> String {
    "versionctl".to_string()
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            probe_timeout_ms: default_probe_timeout(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            title: default_title(),
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl EnvironmentConfig {
    pub fn suffix(&self) -> String {
        self.suffix
            .clone()
            .unwrap_or_else(|| default_suffix(&self.name))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            bail!("at least one [[environments]] entry is required");
        }
        if self.refresh.interval_secs == 0 {
            bail!("refresh.interval_secs must be greater than zero");
        }
        if self.refresh.probe_timeout_ms == 0 {
            bail!("refresh.probe_timeout_ms must be greater than zero");
        }
        if self.refresh.max_concurrent_probes == 0 {
            bail!("refresh.max_concurrent_probes must be greater than zero");
        }

        let mut names = HashSet::new();
        let mut suffixes = HashSet::new();
        for env in &self.environments {
            if env.name.is_empty() {
                bail!("environment name must not be empty");
            }
            if env.registry_urls.is_empty() {
                bail!("environment {} has no registry_urls", env.name);
            }
            if !names.insert(env.name.as_str()) {
                bail!("environment {} is configured twice", env.name);
            }
            if !suffixes.insert(env.suffix()) {
                bail!("suffix {} is used by more than one environment", env.suffix());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [source]
        url = "http://puppet.internal:1015/versions"

        [[environments]]
        name = "qa"
        registry_urls = ["http://is.qa.internal:3000/services", "http://10.0.3.103:3000/services"]

        [[environments]]
        name = "production"
        registry_urls = ["http://is.internal:3000/services"]
        suffix = "_prod"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.refresh.interval(), Duration::from_secs(120));
        assert_eq!(config.refresh.probe_timeout(), Duration::from_secs(1));
        assert_eq!(config.refresh.max_concurrent_probes, 16);
        assert_eq!(config.api.listen, "[::]:9000");
        assert_eq!(config.api.title, "versionctl");
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn test_environment_order_and_suffixes() {
        let config = Config::parse(MINIMAL).unwrap();
        let names: Vec<_> = config.environments.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["qa", "production"]);
        assert_eq!(config.environments[0].suffix(), "_qa");
        assert_eq!(config.environments[1].suffix(), "_prod");
        assert_eq!(config.environments[0].registry_urls.len(), 2);
    }

    #[test]
    fn test_aliases_parsed() {
        let contents = format!("{}\n[aliases]\nfoo = [\"foo-api\", \"foo-worker\"]\n", MINIMAL);
        let config = Config::parse(&contents).unwrap();
        assert_eq!(config.aliases["foo"], ["foo-api", "foo-worker"]);
    }

    #[test]
    fn test_rejects_missing_environments() {
        let contents = r#"
            environments = []
            [source]
            url = "http://puppet.internal:1015/versions"
        "#;
        assert!(Config::parse(contents).is_err());
    }

    #[test]
    fn test_rejects_duplicate_suffix() {
        let contents = r#"
            [source]
            url = "http://puppet.internal:1015/versions"

            [[environments]]
            name = "qa"
            registry_urls = ["http://a/services"]

            [[environments]]
            name = "staging"
            registry_urls = ["http://b/services"]
            suffix = "_qa"
        "#;
        assert!(Config::parse(contents).is_err());
    }

    #[test]
    fn test_rejects_zero_probe_cap() {
        let contents = format!("[refresh]\nmax_concurrent_probes = 0\n{}", MINIMAL);
        assert!(Config::parse(&contents).is_err());
    }
}
