use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::protocol::FAILURE_MARKER;

/// An address advertised by the service registry for one running instance.
///
/// Registries publish either a bare address, which is probed directly, or a
/// whitespace-separated `service management` pair. For pairs the management
/// address is authoritative for probing and the service address is display-only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    Single(String),
    Pair { service: String, management: String },
}

impl Endpoint {
    /// Parse a registry address string. Returns `None` for empty strings or
    /// anything with more than two fields.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.split_whitespace();
        let first = fields.next()?;
        match (fields.next(), fields.next()) {
            (None, _) => Some(Self::Single(first.to_string())),
            (Some(second), None) => Some(Self::Pair {
                service: first.to_string(),
                management: second.to_string(),
            }),
            (Some(_), Some(_)) => None,
        }
    }

    /// Address the prober should query
    pub fn probe_address(&self) -> &str {
        match self {
            Self::Single(addr) => addr,
            Self::Pair { management, .. } => management,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(addr) => f.write_str(addr),
            Self::Pair { service, management } => write!(f, "{} {}", service, management),
        }
    }
}

/// What a single probe learned about one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// The instance answered with exactly one version.
    Version { version: String },
    /// The instance answered, but its info document did not name a single version.
    Unverified { reason: String },
    /// Transport failure, timeout, bad status or unparsable body.
    Unreachable { reason: String },
}

impl Observation {
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Version { version } => Some(version),
            _ => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::Unreachable { .. })
    }

    /// Text shown in place of the observation: the version, or `Failed: <reason>`
    pub fn marker(&self) -> String {
        match self {
            Self::Version { version } => version.clone(),
            Self::Unverified { reason } | Self::Unreachable { reason } => {
                format!("{}: {}", FAILURE_MARKER, reason)
            }
        }
    }
}

/// Drift classification for one service in one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Match,
    Mismatch,
    Degraded,
    Unreachable,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Mismatch => "mismatch",
            Self::Degraded => "degraded",
            Self::Unreachable => "unreachable",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reconciliation result for one service in one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    /// Environment name, e.g. "qa"
    pub environment: String,

    /// Base name from the declared key, or the runtime name when nothing was declared
    pub service_name: String,

    /// Version of record; present only when the version source had a key for
    /// this service in this environment
    pub declared_version: Option<String>,

    /// Runtime service names folded into this entry
    pub matched_services: Vec<String>,

    /// Observation per endpoint, keyed by the registry's address string.
    /// An address listed more than once (by one service, or by several
    /// services folded together) keeps only its last observation.
    pub observed_versions: BTreeMap<String, Observation>,

    pub status: Status,
}

/// The complete, atomically published result of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,

    /// environment -> service name -> entry. Every configured environment is
    /// present, even when empty.
    pub entries: BTreeMap<String, BTreeMap<String, ReconciliationEntry>>,
}

impl Snapshot {
    pub fn environment(&self, name: &str) -> Option<&BTreeMap<String, ReconciliationEntry>> {
        self.entries.get(name)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(|services| services.len()).sum()
    }

    /// Number of entries per status, across all environments
    pub fn status_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values().flat_map(|services| services.values()) {
            *counts.entry(entry.status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// What a renderer receives: the current snapshot, or its absence before the
/// first refresh completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    pub title: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub snapshot: Option<Snapshot>,
}

impl PageView {
    pub fn new(title: impl Into<String>, snapshot: Option<Snapshot>) -> Self {
        Self {
            title: title.into(),
            captured_at: snapshot.as_ref().map(|s| s.captured_at),
            snapshot,
        }
    }
}
