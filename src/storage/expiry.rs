//! Background Expiry Reaper
//!
//! This module implements a background task that periodically removes lapsed
//! keys from the store. This is "active expiry", as opposed to the "lazy
//! expiry" GET performs on access.
//!
//! Lazy expiry alone never frees a key that is not read again, so the reaper
//! wakes on a fixed interval and sweeps the whole map under the write lock.
//!
//! ## Lifecycle
//!
//! The reaper runs as a Tokio task and is controlled through an
//! [`ExpiryReaper`] handle:
//! 1. Sleeps for the configured interval (default: 1s)
//! 2. Wakes up and calls [`Store::cleanup_expired`]
//! 3. Logs how many keys were removed
//! 4. Exits promptly when the handle signals shutdown or is dropped

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default interval between sweeps.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the expiry reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Interval between sweeps (default: 1s)
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REAPER_INTERVAL,
        }
    }
}

/// A handle to the running expiry reaper.
///
/// When this handle is dropped, the reaper task is told to stop. Use
/// [`ExpiryReaper::shutdown`] to also wait for it to finish.
#[derive(Debug)]
pub struct ExpiryReaper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    /// The spawned sweep task
    task: Option<JoinHandle<()>>,
}

impl ExpiryReaper {
    /// Starts the expiry reaper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use redlite::storage::{ExpiryReaper, ReaperConfig, Store};
    /// use std::sync::Arc;
    ///
    /// # async fn run() {
    /// let store = Arc::new(Store::new());
    /// let reaper = ExpiryReaper::start(store, ReaperConfig::default());
    ///
    /// // Reaper runs in the background...
    ///
    /// reaper.shutdown().await;
    /// # }
    /// ```
    pub fn start(store: Arc<Store>, config: ReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let interval_ms = config.interval.as_millis() as u64;
        let task = tokio::spawn(reaper_loop(store, config, shutdown_rx));

        info!(interval_ms, "Background expiry reaper started");

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the reaper to stop without waiting for it.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals the reaper to stop and waits for the task to exit.
    pub async fn shutdown(mut self) {
        self.stop();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Expiry reaper task ended abnormally");
            }
        }

        info!("Background expiry reaper stopped");
    }
}

impl Drop for ExpiryReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main reaper loop.
async fn reaper_loop(
    store: Arc<Store>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry reaper received shutdown signal");
                    return;
                }
            }
        }

        let expired = store.cleanup_expired();

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = store.len(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry reaper with the given sweep interval.
pub fn start_expiry_reaper(store: Arc<Store>, interval: Duration) -> ExpiryReaper {
    ExpiryReaper::start(store, ReaperConfig { interval })
}
