use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::Result;
use shared::types::Snapshot;
use crate::error::ReconcileError;
use crate::store::{db::SnapshotDb, hash};

/// A durable snapshot together with its digest, as handed to readers
#[derive(Debug)]
pub struct Current {
    pub snapshot: Snapshot,
    pub digest: String,
}

/// Commands sent to the store thread
pub enum StoreCommand {
    Put(Snapshot, oneshot::Sender<Result<Arc<Current>, ReconcileError>>),
    Shutdown,
}

/// Write side of the store. Owned by the refresh scheduler; not `Clone`, so
/// there is exactly one writer.
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

/// Read side of the store. Cheap to clone; never blocks on a refresh.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Option<Arc<Current>>>,
}

impl SnapshotReader {
    /// The latest durable snapshot, or `None` before any cycle has completed
    pub fn get(&self) -> Option<Arc<Current>> {
        self.rx.borrow().clone()
    }

    /// Wait until a snapshot newer than the last one seen is published
    #[cfg(test)]
    pub async fn changed(&mut self) -> Result<()> {
        self.rx.changed().await?;
        Ok(())
    }
}

impl StoreHandle {
    /// Spawn the store thread, seeding readers with whatever the database
    /// already holds.
    pub fn spawn(db: SnapshotDb) -> Result<(Self, SnapshotReader)> {
        let initial = match db.load()? {
            Some((snapshot, digest)) => {
                tracing::info!(
                    "Reloaded snapshot captured at {} ({})",
                    snapshot.captured_at,
                    digest
                );
                Some(Arc::new(Current { snapshot, digest }))
            }
            None => None,
        };

        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(16);

        thread::spawn(move || {
            let mut db = db;
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Put(snapshot, reply) => {
                        let result = write(&mut db, snapshot);
                        // readers only ever see snapshots that are already durable
                        if let Ok(current) = &result {
                            snapshot_tx.send_replace(Some(current.clone()));
                        }
                        let _ = reply.send(result);
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Ok((Self { tx }, SnapshotReader { rx: snapshot_rx }))
    }

    /// Durably replace the current snapshot, then publish it to readers.
    /// On failure the previous snapshot stays current.
    pub async fn put(&self, snapshot: Snapshot) -> Result<Arc<Current>, ReconcileError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::Put(snapshot, reply))
            .await
            .map_err(|e| ReconcileError::StoreWriteFailure(e.to_string()))?;
        rx.await
            .map_err(|e| ReconcileError::StoreWriteFailure(e.to_string()))?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}

fn write(db: &mut SnapshotDb, snapshot: Snapshot) -> Result<Arc<Current>, ReconcileError> {
    let digest = hash::compute_digest(&snapshot)
        .map_err(|e| ReconcileError::StoreWriteFailure(e.to_string()))?;
    db.put(&snapshot, &digest)
        .map_err(|e| ReconcileError::StoreWriteFailure(format!("{:#}", e)))?;
    Ok(Arc::new(Current { snapshot, digest }))
}
