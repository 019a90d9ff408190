use std::collections::{BTreeMap, BTreeSet};
use crate::config::EnvironmentConfig;
use crate::sources::version_source::DeclaredVersionMap;

/// How a declared base name was joined to runtime service names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Alias,
    Exact,
    Substring,
    Unmatched,
}

/// Declared version and runtime services joined under one service name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub service_name: String,
    pub declared_version: Option<String>,
    pub matched_services: Vec<String>,
}

/// environment -> service name -> bucket
pub type Correlation = BTreeMap<String, BTreeMap<String, Bucket>>;

/// Joins declared-version keys such as `foo_qa` to the runtime registry's
/// service names.
pub struct Correlator {
    /// (suffix, environment), longest suffix first
    suffixes: Vec<(String, String)>,
    environments: Vec<String>,
    aliases: BTreeMap<String, Vec<String>>,
}

impl Correlator {
    pub fn new(environments: &[EnvironmentConfig], aliases: BTreeMap<String, Vec<String>>) -> Self {
        let mut suffixes: Vec<(String, String)> = environments
            .iter()
            .map(|env| (env.suffix(), env.name.clone()))
            .collect();
        suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self {
            suffixes,
            environments: environments.iter().map(|env| env.name.clone()).collect(),
            aliases,
        }
    }

    /// Split a declared key into its base name and environment. Keys without
    /// a recognised suffix, or with nothing before it, yield `None`.
    pub fn split_key<'a>(&'a self, key: &'a str) -> Option<(&'a str, &'a str)> {
        self.suffixes.iter().find_map(|(suffix, env)| {
            key.strip_suffix(suffix.as_str())
                .filter(|base| !base.is_empty())
                .map(|base| (base, env.as_str()))
        })
    }

    /// Find the runtime services a base name refers to: the alias table first,
    /// then an exact name, then any name containing the base.
    pub fn match_services<'r>(
        &self,
        base: &str,
        runtime: &'r BTreeSet<String>,
    ) -> (MatchRule, Vec<&'r str>) {
        if let Some(aliases) = self.aliases.get(base) {
            let found: Vec<&str> = runtime
                .iter()
                .filter(|name| aliases.contains(name))
                .map(String::as_str)
                .collect();
            if !found.is_empty() {
                return (MatchRule::Alias, found);
            }
        }

        if let Some(name) = runtime.get(base) {
            return (MatchRule::Exact, vec![name.as_str()]);
        }

        let found: Vec<&str> = runtime
            .iter()
            .filter(|name| name.contains(base))
            .map(String::as_str)
            .collect();
        if found.is_empty() {
            (MatchRule::Unmatched, found)
        } else {
            (MatchRule::Substring, found)
        }
    }

    /// Join declared versions with the running services of each environment.
    ///
    /// Every configured environment is present in the result. Running services
    /// that no declared key claimed get a bucket of their own with no
    /// declared version.
    pub fn correlate(
        &self,
        declared: &DeclaredVersionMap,
        running: &BTreeMap<String, BTreeSet<String>>,
    ) -> Correlation {
        let empty = BTreeSet::new();
        let mut correlation: Correlation = self
            .environments
            .iter()
            .map(|env| (env.clone(), BTreeMap::new()))
            .collect();
        let mut claimed: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for (key, version) in declared {
            let Some((base, env)) = self.split_key(key) else {
                tracing::debug!("Skipping declared key {} with no known environment suffix", key);
                continue;
            };
            let runtime = running.get(env).unwrap_or(&empty);
            let (rule, names) = self.match_services(base, runtime);

            match rule {
                MatchRule::Substring if names.len() > 1 => tracing::warn!(
                    "{} in {} matches several services by substring, merging: {}",
                    base,
                    env,
                    names.join(", ")
                ),
                MatchRule::Substring => {
                    tracing::debug!("{} in {} matched {} by substring", base, env, names[0])
                }
                MatchRule::Unmatched => tracing::debug!("{} in {} has no running service", base, env),
                MatchRule::Alias | MatchRule::Exact => {}
            }

            claimed.entry(env).or_default().extend(names.iter().copied());

            if let Some(buckets) = correlation.get_mut(env) {
                buckets.insert(
                    base.to_string(),
                    Bucket {
                        service_name: base.to_string(),
                        declared_version: Some(version.clone()),
                        matched_services: names.iter().map(|n| n.to_string()).collect(),
                    },
                );
            }
        }

        for (env, buckets) in correlation.iter_mut() {
            let runtime = running.get(env).unwrap_or(&empty);
            let taken = claimed.get(env.as_str());
            for name in runtime {
                if taken.is_some_and(|t| t.contains(name.as_str())) {
                    continue;
                }
                match buckets.get_mut(name) {
                    Some(bucket) => {
                        tracing::warn!("Unclaimed service {} in {} shares a declared name, folding in", name, env);
                        bucket.matched_services.push(name.clone());
                    }
                    None => {
                        buckets.insert(
                            name.clone(),
                            Bucket {
                                service_name: name.clone(),
                                declared_version: None,
                                matched_services: vec![name.clone()],
                            },
                        );
                    }
                }
            }
        }

        correlation
    }
}
