//! Background eviction of idle sessions
//!
//! The sweeper is either idle (waiting for the next tick) or sweeping (one
//! pass over the store). Passes never overlap: a pass requested while another
//! one is running is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::session::SessionStore;

/// Smallest period accepted for the sweep timer
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Sweeper state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperState {
    Idle,
    Sweeping,
}

/// Sweeper timing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Sessions idle longer than this are evicted
    pub max_idle: Duration,
    /// Time between passes
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SweeperConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_idle: config.max_idle(),
            interval: config.sweep_interval(),
        }
    }
}

/// Periodic idle-session evictor
pub struct Sweeper {
    store: SessionStore,
    config: SweeperConfig,
    sweeping: AtomicBool,
    evicted_total: AtomicU64,
}

impl Sweeper {
    pub fn new(store: SessionStore, config: SweeperConfig) -> Self {
        Self {
            store,
            config,
            sweeping: AtomicBool::new(false),
            evicted_total: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> SweeperConfig {
        self.config
    }

    pub fn state(&self) -> SweeperState {
        if self.sweeping.load(Ordering::Acquire) {
            SweeperState::Sweeping
        } else {
            SweeperState::Idle
        }
    }

    /// Total sessions evicted by this sweeper since it was created
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }

    /// Run one sweep pass now.
    ///
    /// Returns the number of evicted sessions, or `None` when a pass was
    /// already running and this one was skipped.
    pub fn sweep_now(&self) -> Option<usize> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already in progress, skipping");
            return None;
        }
        let _pass = PassGuard(&self.sweeping);

        let removed = self.store.sweep(self.config.max_idle);
        self.evicted_total.fetch_add(removed as u64, Ordering::Relaxed);

        if removed > 0 {
            info!(removed, remaining = self.store.len(), "Swept idle sessions");
        } else {
            debug!(remaining = self.store.len(), "Sweep found no idle sessions");
        }
        Some(removed)
    }

    /// Start the periodic sweep task
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let period = self.config.interval.max(MIN_SWEEP_INTERVAL);

        let handle = tokio::spawn(async move {
            info!(
                interval_secs = period.as_secs(),
                max_idle_secs = self.config.max_idle.as_secs(),
                "Session sweeper started"
            );

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_now();
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            info!("Session sweeper stopped");
        });

        SweeperHandle { shutdown_tx, handle }
    }
}

/// Resets the sweeping flag when a pass ends, even by panic
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a running sweeper task
pub struct SweeperHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
