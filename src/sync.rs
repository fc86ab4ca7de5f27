//! Background synchronization lifecycle
//!
//! A [`SyncWorker`] owns one long-lived task that ticks on a fixed interval and
//! hands each tick to a [`SyncDriver`]. The worker, not the driver, owns the
//! committee status:
//!
//! ```text
//! STARTING --first healthy tick with data--> ACTIVE
//!    |                                          |
//!    +------ fatal tick error or stop ----------+--> INACTIVE
//! ```
//!
//! There is no way back from `INACTIVE`; restarting is up to the embedding
//! process.

use crate::error::{CommitteeError, Result};
use crate::types::CommitteeStatus;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shared, lock-protected committee status
#[derive(Debug, Clone)]
pub struct StatusCell {
    name: &'static str,
    state: Arc<RwLock<CommitteeStatus>>,
}

impl StatusCell {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(RwLock::new(CommitteeStatus::Starting)),
        }
    }

    pub fn get(&self) -> CommitteeStatus {
        *self.state.read()
    }

    /// `STARTING -> ACTIVE`; no effect in any other state
    fn activate(&self) {
        let mut state = self.state.write();
        if *state == CommitteeStatus::Starting {
            *state = CommitteeStatus::Active;
            info!("{} status: {}", self.name, CommitteeStatus::Active);
        }
    }

    fn deactivate(&self) {
        let mut state = self.state.write();
        if *state != CommitteeStatus::Inactive {
            *state = CommitteeStatus::Inactive;
            info!("{} status: {}", self.name, CommitteeStatus::Inactive);
        }
    }
}

/// One synchronization pass, driven by the worker's ticker
#[async_trait]
pub trait SyncDriver: Send + Sync + 'static {
    /// Catch up as far as possible
    ///
    /// Returns `true` once the archive holds at least one epoch. Implementations
    /// should check `shutdown` before every blocking call they start and return
    /// [`CommitteeError::Cancelled`] when it is raised.
    async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<bool>;
}

/// Owns the background sync task of one committee
pub struct SyncWorker {
    status: StatusCell,
    poll_interval: Duration,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncWorker {
    pub fn new(name: &'static str, poll_interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            status: StatusCell::new(name),
            poll_interval,
            started: AtomicBool::new(false),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    pub fn status(&self) -> CommitteeStatus {
        self.status.get()
    }

    /// Spawn the sync task; a worker can be started once
    pub async fn start(&self, driver: Arc<dyn SyncDriver>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CommitteeError::AlreadyStarted);
        }
        if self.status.get() == CommitteeStatus::Inactive {
            return Err(CommitteeError::Cancelled);
        }

        let mut handle = self.handle.lock().await;
        let status = self.status.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Starting {} sync loop (poll every {:?})",
            status.name, self.poll_interval
        );

        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                match driver.tick(&shutdown_rx).await {
                    Ok(true) => status.activate(),
                    Ok(false) => debug!("{} sync tick: nothing archived yet", status.name),
                    Err(CommitteeError::Cancelled) => break,
                    Err(e) => {
                        error!("{} sync loop halted: {}", status.name, e);
                        status.deactivate();
                        break;
                    }
                }
            }
            debug!("{} sync loop exited", status.name);
        }));
        Ok(())
    }

    /// Signal the task to exit and wait for it; idempotent
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("{} sync task ended abnormally: {}", self.status.name, e);
            }
        }
        self.status.deactivate();
    }

    /// Whether the task has exited, on its own or after `stop`
    pub async fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Becomes ready on tick `ready_at`, fails on tick `fail_at`
    struct CountingDriver {
        ticks: AtomicU32,
        ready_at: u32,
        fail_at: Option<u32>,
    }

    #[async_trait]
    impl SyncDriver for CountingDriver {
        async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<bool> {
            if *shutdown.borrow() {
                return Err(CommitteeError::Cancelled);
            }
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_at == Some(tick) {
                return Err(CommitteeError::Corrupted("bad page".into()));
            }
            Ok(tick >= self.ready_at)
        }
    }

    fn driver(ready_at: u32, fail_at: Option<u32>) -> Arc<CountingDriver> {
        Arc::new(CountingDriver {
            ticks: AtomicU32::new(0),
            ready_at,
            fail_at,
        })
    }

    async fn wait_for(worker: &SyncWorker, status: CommitteeStatus) {
        for _ in 0..200 {
            if worker.status() == status {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("status never became {}", status);
    }

    #[tokio::test]
    async fn test_activates_then_stops() {
        let worker = SyncWorker::new("test", Duration::from_millis(5));
        let driver = driver(3, None);
        assert_eq!(worker.status(), CommitteeStatus::Starting);

        worker.start(driver.clone()).await.unwrap();
        wait_for(&worker, CommitteeStatus::Active).await;
        assert!(driver.ticks.load(Ordering::SeqCst) >= 3);

        worker.stop().await;
        assert_eq!(worker.status(), CommitteeStatus::Inactive);
        assert!(worker.is_finished().await);

        let ticks = driver.ticks.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(driver.ticks.load(Ordering::SeqCst), ticks);

        worker.stop().await;
        assert_eq!(worker.status(), CommitteeStatus::Inactive);
    }

    #[tokio::test]
    async fn test_fatal_error_deactivates() {
        let worker = SyncWorker::new("test", Duration::from_millis(5));
        let driver = driver(1, Some(4));
        worker.start(driver.clone()).await.unwrap();

        wait_for(&worker, CommitteeStatus::Inactive).await;
        for _ in 0..200 {
            if worker.is_finished().await {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        assert!(worker.is_finished().await);
        assert_eq!(driver.ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let worker = SyncWorker::new("test", Duration::from_millis(50));
        worker.start(driver(1, None)).await.unwrap();
        let err = worker.start(driver(1, None)).await.unwrap_err();
        assert!(matches!(err, CommitteeError::AlreadyStarted));
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let worker = SyncWorker::new("test", Duration::from_millis(5));
        worker.stop().await;
        assert_eq!(worker.status(), CommitteeStatus::Inactive);
        let err = worker.start(driver(1, None)).await.unwrap_err();
        assert!(matches!(err, CommitteeError::Cancelled));
    }
}
