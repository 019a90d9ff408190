use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use crate::pipeline::Pipeline;
use crate::store_manager::{Current, StoreHandle};

/// Whether a refresh cycle is in flight
enum RefreshState {
    Idle,
    Refreshing(JoinHandle<()>),
}

impl RefreshState {
    /// Settle a finished cycle back to `Idle` and report whether one is still running
    fn is_refreshing(&mut self) -> bool {
        if let Self::Refreshing(handle) = self {
            if !handle.is_finished() {
                return true;
            }
            *self = Self::Idle;
        }
        false
    }
}

/// Run one cycle and store its snapshot. A failed write is logged and the
/// previous snapshot stays current.
pub async fn refresh_once(pipeline: &Pipeline, store: &StoreHandle) -> Option<Arc<Current>> {
    let started = std::time::Instant::now();
    let snapshot = pipeline.run_cycle().await;
    let entries = snapshot.entry_count();
    let counts = snapshot.status_counts();

    match store.put(snapshot).await {
        Ok(current) => {
            tracing::info!(
                "Refresh complete in {:?}: {} entries {:?}, digest {}",
                started.elapsed(),
                entries,
                counts,
                current.digest
            );
            Some(current)
        }
        Err(e) => {
            tracing::error!("Refresh discarded: {}", e);
            None
        }
    }
}

/// Refresh on a fixed interval until cancelled.
///
/// The timer fires unconditionally; a tick that arrives while the previous
/// cycle is still running is skipped, not queued. The first tick fires
/// immediately.
pub async fn run(
    pipeline: Arc<Pipeline>,
    store: StoreHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let store = Arc::new(store);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut state = RefreshState::Idle;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if state.is_refreshing() {
                    tracing::warn!("Previous refresh still running, skipping this interval");
                    continue;
                }
                let pipeline = pipeline.clone();
                let store = store.clone();
                state = RefreshState::Refreshing(tokio::spawn(async move {
                    refresh_once(&pipeline, &store).await;
                }));
            }
            _ = cancel.cancelled() => {
                tracing::info!("Refresh scheduler shutting down");
                break;
            }
        }
    }

    if let RefreshState::Refreshing(handle) = state {
        handle.abort();
        let _ = handle.await;
    }
    store.shutdown().await?;

    Ok(())
}
