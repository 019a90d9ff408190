use std::collections::BTreeMap;
use std::net::SocketAddr;
use axum::Router;
use chrono::{TimeZone, Utc};
use tokio::net::TcpListener;
use shared::types::{ReconciliationEntry, Snapshot, Status};

/// Serve `app` on an ephemeral local port for the lifetime of the test runtime
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A local address with nothing listening on it
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Two-environment snapshot whose only entry declares `version`
pub fn test_snapshot(version: &str) -> Snapshot {
    let entry = ReconciliationEntry {
        environment: "qa".to_string(),
        service_name: "foo".to_string(),
        declared_version: Some(version.to_string()),
        matched_services: vec!["foo".to_string()],
        observed_versions: BTreeMap::new(),
        status: Status::Unknown,
    };
    Snapshot {
        captured_at: Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        entries: BTreeMap::from([
            ("qa".to_string(), BTreeMap::from([("foo".to_string(), entry)])),
            ("production".to_string(), BTreeMap::new()),
        ]),
    }
}
