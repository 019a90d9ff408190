use std::collections::BTreeMap;
use sha2::{Sha256, Digest};
use shared::types::{ReconciliationEntry, Snapshot};

/// SHA-256 over a snapshot's entries, excluding `captured_at`, so two cycles
/// that saw identical collaborator responses share a digest.
pub fn compute_digest(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    let entries: &BTreeMap<String, BTreeMap<String, ReconciliationEntry>> = &snapshot.entries;
    let json = serde_json::to_vec(entries)?;

    let hash = Sha256::digest(&json);
    Ok(hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::test_support::test_snapshot;

    #[test]
    fn test_digest_ignores_capture_time() {
        let first = test_snapshot("1.2.0");
        let mut second = test_snapshot("1.2.0");
        second.captured_at = second.captured_at + Duration::seconds(120);

        assert_eq!(compute_digest(&first).unwrap(), compute_digest(&second).unwrap());
    }

    #[test]
    fn test_digest_changes_with_entries() {
        let first = test_snapshot("1.2.0");
        let second = test_snapshot("1.3.0");

        assert_ne!(compute_digest(&first).unwrap(), compute_digest(&second).unwrap());
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let digest = compute_digest(&test_snapshot("1.2.0")).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
