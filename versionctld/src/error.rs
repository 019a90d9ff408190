use thiserror::Error;

/// Failures a refresh cycle can run into. Probe failures are not listed here:
/// they are recorded as `Observation::Unreachable` and never propagate.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("source unavailable: {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("snapshot store write failed: {0}")]
    StoreWriteFailure(String),
}

impl ReconcileError {
    pub fn unavailable(url: &str, err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn malformed(url: &str, err: impl std::fmt::Display) -> Self {
        Self::MalformedResponse {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
