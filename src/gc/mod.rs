//! Two-Tier TTL Garbage Collection
//!
//! Expiring keys are tracked in two tiers split at a 2-second horizon:
//!
//! - **NearQueue**: a min-heap holding deadlines inside the near window.
//!   A heap gives exact ordering where precision matters, and the window
//!   keeps it small enough that O(log n) inserts stay cheap.
//! - **HashedWheel**: a ring of slots for everything further out. O(1)
//!   insertion regardless of population, at the cost of one tick of
//!   precision nobody notices on multi-second TTLs.
//!
//! Neither tier deletes anything itself. Expired keys funnel into a
//! [`DeleteCoalescer`] whose periodic flush hands a deduplicated batch to
//! the shard's copy-on-write delete, so a burst of expirations costs one
//! segment rewrite instead of hundreds.
//!
//! ```text
//!  schedule(key, ttl) ──> within 2s? ──yes──> NearQueue  (50ms ticks)
//!                             │no                  │
//!                             └────> HashedWheel   │ expired keys
//!                                    (500ms ticks) │
//!                                         │        ▼
//!                                         └──> DeleteCoalescer
//!                                                   │ flush (10ms)
//!                                                   ▼
//!                                            shard delete_batch
//! ```
//!
//! The driver task lives with the shard (it needs the shard's delete
//! path); this module owns the data structures and the tick operations.

pub mod coalescer;
pub mod near_queue;
pub mod wheel;

pub use coalescer::DeleteCoalescer;
pub use near_queue::NearQueue;
pub use wheel::HashedWheel;

use crate::util::now_millis;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Tuning knobs for the expiration machinery.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Number of wheel slots
    pub wheel_slots: usize,
    /// Wheel tick interval in milliseconds
    pub wheel_tick_ms: i64,
    /// Horizon below which deadlines go to the near queue, milliseconds
    pub near_window_ms: i64,
    /// Near queue drain interval in milliseconds
    pub near_tick_ms: u64,
    /// Coalescer flush interval in milliseconds (clamped to [5, 50])
    pub coalescer_flush_ms: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            wheel_slots: 2_048,
            wheel_tick_ms: 500,
            near_window_ms: 2_000,
            near_tick_ms: 50,
            coalescer_flush_ms: 10,
        }
    }
}

/// Per-shard expiration scheduler.
///
/// `schedule`/`cancel` are called from the shard's write path and
/// `schedule_delete` from its read path; the tick methods are called by
/// the shard's background driver task.
#[derive(Debug)]
pub struct TtlScheduler {
    near: Mutex<NearQueue>,
    wheel: Mutex<HashedWheel>,
    coalescer: DeleteCoalescer,
    config: GcConfig,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl TtlScheduler {
    pub fn new(config: GcConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            near: Mutex::new(NearQueue::new(config.near_window_ms)),
            wheel: Mutex::new(HashedWheel::new(config.wheel_slots, config.wheel_tick_ms)),
            coalescer: DeleteCoalescer::new(config.coalescer_flush_ms),
            config,
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Schedules expiration for a key written with the given TTL.
    ///
    /// A non-positive TTL cancels any prior schedule: the key now lives
    /// forever. Rescheduling an already-tracked key replaces its previous
    /// deadline, removing it from the other tier when the new deadline
    /// moves it across the window boundary.
    pub fn schedule(&self, key: &str, ttl_nanos: i64, created_at_nanos: i64) {
        if ttl_nanos <= 0 {
            self.cancel(key);
            return;
        }

        let expire_at_ms = (created_at_nanos + ttl_nanos) / 1_000_000;
        let now = now_millis();

        if self.near.lock().add(key, expire_at_ms, now) {
            self.wheel.lock().remove(key);
        } else {
            self.near.lock().remove(key);
            self.wheel.lock().add(key, expire_at_ms, now);
        }
    }

    /// Drops any pending expiration for a key. Safe to call for keys that
    /// were never scheduled.
    pub fn cancel(&self, key: &str) {
        self.near.lock().remove(key);
        self.wheel.lock().remove(key);
    }

    /// Queues a key for the next batched delete (lazy expiry, consumed
    /// single-read entries).
    pub fn schedule_delete(&self, key: &str) {
        self.coalescer.enqueue(key);
    }

    /// Moves near-queue deadlines that have passed into the coalescer.
    pub fn tick_near(&self) {
        let expired = self.near.lock().drain_expired(now_millis());
        self.coalescer.enqueue_batch(expired);
    }

    /// Advances the wheel one slot, moving expired keys into the coalescer.
    pub fn tick_wheel(&self) {
        let expired = self.wheel.lock().advance(now_millis());
        self.coalescer.enqueue_batch(expired);
    }

    /// Takes the current batch of keys awaiting deletion.
    pub fn drain_pending(&self) -> Vec<String> {
        self.coalescer.drain()
    }

    /// Marks the scheduler started. Returns `false` if it already was, so
    /// the driver task is only spawned once.
    pub fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Signals the driver task to flush and exit.
    pub fn signal_stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Tick intervals for the driver task: (near, wheel, flush).
    pub fn tick_intervals(&self) -> (Duration, Duration, Duration) {
        (
            Duration::from_millis(self.config.near_tick_ms),
            Duration::from_millis(self.config.wheel_tick_ms as u64),
            Duration::from_millis(self.coalescer.flush_ms()),
        )
    }

    /// Number of keys with a tracked deadline, across both tiers.
    pub fn scheduled_len(&self) -> usize {
        self.near.lock().len() + self.wheel.lock().len()
    }
}

impl Default for TtlScheduler {
    fn default() -> Self {
        Self::new(GcConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::now_nanos;

    #[test]
    fn test_schedule_picks_tier_by_window() {
        let gc = TtlScheduler::default();
        let now = now_nanos();

        gc.schedule("near", 500_000_000, now); // 500ms -> near queue
        gc.schedule("far", 60_000_000_000, now); // 60s -> wheel

        assert_eq!(gc.near.lock().len(), 1);
        assert_eq!(gc.wheel.lock().len(), 1);
    }

    #[test]
    fn test_zero_ttl_cancels() {
        let gc = TtlScheduler::default();
        let now = now_nanos();

        gc.schedule("k", 500_000_000, now);
        assert_eq!(gc.scheduled_len(), 1);

        gc.schedule("k", 0, now);
        assert_eq!(gc.scheduled_len(), 0);
    }

    #[test]
    fn test_reschedule_moves_between_tiers() {
        let gc = TtlScheduler::default();
        let now = now_nanos();

        gc.schedule("k", 500_000_000, now);
        assert_eq!(gc.near.lock().len(), 1);

        // Longer TTL moves it to the wheel and out of the heap
        gc.schedule("k", 60_000_000_000, now);
        assert_eq!(gc.near.lock().len(), 0);
        assert_eq!(gc.wheel.lock().len(), 1);

        // And back
        gc.schedule("k", 100_000_000, now);
        assert_eq!(gc.near.lock().len(), 1);
        assert_eq!(gc.wheel.lock().len(), 0);
    }

    #[test]
    fn test_tick_near_feeds_coalescer() {
        let gc = TtlScheduler::default();
        // Already-expired deadline
        gc.schedule("gone", 1, now_nanos() - 1_000_000_000);

        gc.tick_near();
        let mut pending = gc.drain_pending();
        pending.sort();
        assert_eq!(pending, vec!["gone".to_string()]);
    }

    #[test]
    fn test_schedule_delete_deduplicates() {
        let gc = TtlScheduler::default();
        gc.schedule_delete("k");
        gc.schedule_delete("k");
        assert_eq!(gc.drain_pending(), vec!["k".to_string()]);
    }

    #[test]
    fn test_mark_started_once() {
        let gc = TtlScheduler::default();
        assert!(gc.mark_started());
        assert!(!gc.mark_started());
    }
}
