//! Copy-on-Write Segmented Index
//!
//! One shard owns a slice of a bucket's keyspace. Its index is a fixed
//! array of segments, each a pair of parallel arrays sorted by key, and
//! the whole index is published through an atomically swapped pointer:
//!
//! - **Readers** load the pointer once and binary-search a segment. No
//!   lock, no allocation; the snapshot stays valid for the whole call
//!   even if a writer publishes a newer index underneath.
//! - **Writers** serialize on a mutex, clone only the touched segment,
//!   splice the change in, and swap the pointer. Segmentation keeps the
//!   rewrite O(segment) instead of O(shard).
//!
//! The only in-place mutation after publication is the pair of atomic
//! access counters inside each entry.

use crate::gc::{GcConfig, TtlScheduler};
use crate::storage::entry::StorageEntry;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Default segments per shard. Write amplification shrinks roughly
/// linearly with this, at the cost of a larger index header.
pub const SEGMENTS_PER_SHARD: usize = 64;

/// One sorted run of the shard's keys.
#[derive(Debug, Default, Clone)]
struct Segment {
    keys: Vec<String>,
    vals: Vec<Arc<StorageEntry>>,
}

/// An immutable snapshot of the whole shard.
#[derive(Debug)]
struct Index {
    segments: Vec<Arc<Segment>>,
}

impl Index {
    fn empty(segment_count: usize) -> Self {
        Self {
            segments: (0..segment_count)
                .map(|_| Arc::new(Segment::default()))
                .collect(),
        }
    }
}

/// A shard: lock-free reads over a copy-on-write segmented index, with
/// its own TTL scheduler.
#[derive(Debug)]
pub struct Shard {
    index: ArcSwap<Index>,
    write_lock: Mutex<()>,
    used_bytes: AtomicI64,
    key_count: AtomicI64,
    gc: TtlScheduler,
}

impl Shard {
    pub fn new(gc_config: GcConfig) -> Self {
        Self::with_segments(gc_config, SEGMENTS_PER_SHARD)
    }

    /// Segment count is fixed for the life of the shard; changing it
    /// means building a new store.
    pub fn with_segments(gc_config: GcConfig, segment_count: usize) -> Self {
        let segment_count = segment_count.max(1);
        Self {
            index: ArcSwap::from_pointee(Index::empty(segment_count)),
            write_lock: Mutex::new(()),
            used_bytes: AtomicI64::new(0),
            key_count: AtomicI64::new(0),
            gc: TtlScheduler::new(gc_config),
        }
    }

    #[inline]
    fn segment_of(key: &str, segment_count: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % segment_count as u64) as usize
    }

    /// Looks up a live entry.
    ///
    /// Runs entirely against one loaded snapshot: the index pointer is
    /// read once and never a lock taken. Expired entries and consumed
    /// single-read entries report absent and are queued for deletion.
    pub fn get(&self, key: &str) -> Option<Arc<StorageEntry>> {
        let idx = self.index.load();
        let seg = &idx.segments[Self::segment_of(key, idx.segments.len())];

        let i = seg.keys.binary_search_by(|k| k.as_str().cmp(key)).ok()?;
        let entry = &seg.vals[i];
        let now = crate::util::now_nanos();

        if entry.is_expired(now) {
            self.gc.schedule_delete(key);
            return None;
        }

        if entry.single_read {
            // Exactly one reader wins the entry; it is then torn down.
            if entry.try_consume() {
                self.gc.schedule_delete(key);
                return Some(Arc::clone(entry));
            }
            return None;
        }

        entry.touch(now);
        Some(Arc::clone(entry))
    }

    /// Inserts or replaces an entry, then schedules its expiration.
    pub fn set(&self, entry: Arc<StorageEntry>) {
        let _guard = self.write_lock.lock();

        let old = self.index.load_full();
        let seg_idx = Self::segment_of(&entry.key, old.segments.len());
        let mut segments = old.segments.clone();
        let old_seg = &old.segments[seg_idx];

        let mut seg = Segment {
            keys: old_seg.keys.clone(),
            vals: old_seg.vals.clone(),
        };

        let mut delta = entry.charged_size();
        match seg.keys.binary_search_by(|k| k.as_str().cmp(&entry.key)) {
            Ok(i) => {
                delta -= seg.vals[i].charged_size();
                seg.vals[i] = Arc::clone(&entry);
            }
            Err(i) => {
                seg.keys.insert(i, entry.key.clone());
                seg.vals.insert(i, Arc::clone(&entry));
                self.key_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        segments[seg_idx] = Arc::new(seg);
        self.index.store(Arc::new(Index { segments }));
        self.used_bytes.fetch_add(delta, Ordering::Relaxed);

        self.gc
            .schedule(&entry.key, entry.ttl_nanos, entry.created_at);
    }

    /// Removes a batch of keys, rewriting each touched segment once.
    ///
    /// Absent keys are skipped, which makes the expiration machinery free
    /// to over-schedule. Returns the number of keys actually removed.
    pub fn delete_batch(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }

        let _guard = self.write_lock.lock();

        let old = self.index.load_full();
        let mut segments = old.segments.clone();

        let mut by_segment: HashMap<usize, Vec<&String>> = HashMap::new();
        for key in keys {
            by_segment
                .entry(Self::segment_of(key, old.segments.len()))
                .or_default()
                .push(key);
        }

        let mut removed = 0usize;
        let mut delta = 0i64;
        for (seg_idx, seg_keys) in by_segment {
            let old_seg = &old.segments[seg_idx];
            let mut seg = Segment {
                keys: old_seg.keys.clone(),
                vals: old_seg.vals.clone(),
            };

            for key in seg_keys {
                let Ok(i) = seg.keys.binary_search_by(|k| k.as_str().cmp(key)) else {
                    continue;
                };
                delta -= seg.vals[i].charged_size();
                seg.keys.remove(i);
                seg.vals.remove(i);
                removed += 1;
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.gc.cancel(key);
            }

            segments[seg_idx] = Arc::new(seg);
        }

        if removed > 0 {
            self.index.store(Arc::new(Index { segments }));
            self.used_bytes.fetch_add(delta, Ordering::Relaxed);
        }
        removed
    }

    /// Checks presence in the index. Does not evaluate liveness beyond
    /// membership, mirroring a raw index probe.
    pub fn exists(&self, key: &str) -> bool {
        let idx = self.index.load();
        let seg = &idx.segments[Self::segment_of(key, idx.segments.len())];
        seg.keys.binary_search_by(|k| k.as_str().cmp(key)).is_ok()
    }

    /// All keys in the current snapshot, segment by segment.
    pub fn keys(&self) -> Vec<String> {
        let idx = self.index.load();
        let total: usize = idx.segments.iter().map(|s| s.keys.len()).sum();
        let mut out = Vec::with_capacity(total);
        for seg in &idx.segments {
            out.extend(seg.keys.iter().cloned());
        }
        out
    }

    pub fn usage(&self) -> i64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    pub fn count(&self) -> i64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn scheduler(&self) -> &TtlScheduler {
        &self.gc
    }

    /// Spawns the shard's expiration driver. Idempotent.
    pub fn start_gc(shard: &Arc<Shard>) {
        if shard.gc.mark_started() {
            let shutdown = shard.gc.subscribe_shutdown();
            tokio::spawn(gc_loop(Arc::clone(shard), shutdown));
        }
    }

    /// Signals the expiration driver to drain and exit.
    pub fn stop_gc(&self) {
        self.gc.signal_stop();
    }
}

/// Drives one shard's expiration: near-queue ticks, wheel ticks, and
/// coalescer flushes, until the stop signal. The final flush on shutdown
/// drains whatever deletions are still pending.
async fn gc_loop(shard: Arc<Shard>, mut shutdown: watch::Receiver<bool>) {
    let (near_every, wheel_every, flush_every) = shard.gc.tick_intervals();
    let mut near_tick = tokio::time::interval(near_every);
    let mut wheel_tick = tokio::time::interval(wheel_every);
    let mut flush_tick = tokio::time::interval(flush_every);

    loop {
        tokio::select! {
            _ = near_tick.tick() => shard.gc.tick_near(),
            _ = wheel_tick.tick() => shard.gc.tick_wheel(),
            _ = flush_tick.tick() => {
                let pending = shard.gc.drain_pending();
                if !pending.is_empty() {
                    let removed = shard.delete_batch(&pending);
                    trace!(pending = pending.len(), removed, "flushed expired keys");
                }
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    shard.gc.tick_near();
                    let pending = shard.gc.drain_pending();
                    if !pending.is_empty() {
                        shard.delete_batch(&pending);
                    }
                    debug!("shard expiration driver stopped");
                    return;
                }
            }
        }
    }
}
