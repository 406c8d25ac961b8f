//! Background Expiry Sweeper
//!
//! Lazy expiry alone never reclaims a key that is written with a TTL and then
//! never read again. The sweeper is a Tokio task that periodically walks the
//! store and drops expired objects ("active expiry").
//!
//! ## Design
//!
//! Each tick:
//! 1. Sleeps for the current interval
//! 2. Cleans up to `shards_per_tick` shards, continuing from where the last
//!    tick stopped, and stops early once `tick_budget` has elapsed
//! 3. Adjusts the interval from the observed expiry rate
//!
//! A single shard pass holds that shard's write lock, so a foreground command
//! never waits behind more than one shard's worth of work.

use crate::storage::Store;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// Shards visited per tick (default: 16 of 64)
    pub shards_per_tick: usize,

    /// Wall-clock budget for one tick (default: 5ms)
    pub tick_budget: Duration,

    /// If this fraction of scanned keys are expired, speed up sweeping
    pub speedup_threshold: f64,

    /// If this fraction of scanned keys are expired, slow down sweeping
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            shards_per_tick: 16,
            tick_budget: Duration::from_millis(5),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the sweeper on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use pulsekv::storage::{Store, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new());
    /// let sweeper = ExpirySweeper::start(store, ExpiryConfig::default());
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(store: Arc<Store>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Called automatically on drop.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outcome of one bounded sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub shards_visited: usize,
    /// Objects held by the visited shards before cleaning
    pub examined: u64,
    pub expired: u64,
    /// Cursor for the next sweep
    pub next_shard: usize,
}

impl SweepReport {
    /// Fraction of the examined objects that had expired, if any were examined.
    pub fn expiry_rate(&self) -> Option<f64> {
        (self.examined > 0).then(|| self.expired as f64 / self.examined as f64)
    }
}

/// Picks the interval before the next tick from the last sweep's expiry rate.
fn next_interval(config: &ExpiryConfig, current: Duration, report: &SweepReport) -> Duration {
    match report.expiry_rate() {
        Some(rate) if rate > config.speedup_threshold => {
            (current / 2).max(config.min_interval)
        }
        Some(rate) if rate < config.slowdown_threshold && report.expired == 0 => {
            (current * 2).min(config.max_interval)
        }
        _ => current,
    }
}

/// Cleans up to `max_shards` shards starting at `start`, stopping early once
/// `budget` has elapsed. At least one shard is always visited.
pub fn sweep_slice(store: &Store, start: usize, max_shards: usize, budget: Duration) -> SweepReport {
    let shard_count = store.shard_count();
    let deadline = Instant::now() + budget;
    let mut cursor = start % shard_count;
    let mut examined = 0;
    let mut expired = 0;
    let mut visited = 0;

    while visited < max_shards.clamp(1, shard_count) {
        let pass = store.cleanup_shard(cursor);
        examined += pass.examined;
        expired += pass.removed;
        cursor = (cursor + 1) % shard_count;
        visited += 1;

        if Instant::now() >= deadline {
            break;
        }
    }

    SweepReport {
        shards_visited: visited,
        examined,
        expired,
        next_shard: cursor,
    }
}

async fn sweeper_loop(
    store: Arc<Store>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;
    let mut cursor = 0;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let report = sweep_slice(&store, cursor, config.shards_per_tick, config.tick_budget);
        cursor = report.next_shard;

        let interval = next_interval(&config, current_interval, &report);
        if interval < current_interval {
            debug!(
                expired = report.expired,
                examined = report.examined,
                rate = %format!("{:.2}%", report.expiry_rate().unwrap_or(0.0) * 100.0),
                new_interval_ms = interval.as_millis(),
                "High expiry rate, speeding up sweeper"
            );
        } else if interval > current_interval {
            trace!(
                new_interval_ms = interval.as_millis(),
                "Low expiry rate, slowing down sweeper"
            );
        }
        current_interval = interval;

        if report.expired > 0 {
            debug!(
                expired = report.expired,
                shards = report.shards_visited,
                keys_remaining = store.len(),
                "Expired keys cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(store: Arc<Store>) -> ExpirySweeper {
    ExpirySweeper::start(store, ExpiryConfig::default())
}
