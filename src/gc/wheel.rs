//! Hashed Timing Wheel
//!
//! Far-future expirations live in a ring of slots, each holding the keys
//! that land on it. Inserting is O(1): the deadline picks a slot and a
//! `rounds` counter records how many full revolutions must pass first.
//! One tick advances the ring by a single slot and sweeps only that slot.
//!
//! Deadlines are smeared by a random offset in [-tick/4, +tick/4] so that
//! bulk inserts with identical TTLs do not all fire on the same tick.

use rand::Rng;
use std::collections::HashMap;

const MIN_SLOTS: usize = 64;
const MAX_SLOTS: usize = 8_192;
const MIN_TICK_MS: i64 = 100;
const MAX_TICK_MS: i64 = 1_000;

#[derive(Debug)]
struct WheelEntry {
    key: String,
    expire_at_ms: i64,
    rounds: i64,
}

/// Ring buffer of pending expirations with per-entry round counters.
#[derive(Debug)]
pub struct HashedWheel {
    slots: Vec<Vec<WheelEntry>>,
    tick_ms: i64,
    current_pos: usize,
    /// key -> slot, so cancellation never scans the ring
    key_index: HashMap<String, usize>,
}

impl HashedWheel {
    pub fn new(slot_count: usize, tick_ms: i64) -> Self {
        let slot_count = slot_count.clamp(MIN_SLOTS, MAX_SLOTS);
        let tick_ms = tick_ms.clamp(MIN_TICK_MS, MAX_TICK_MS);

        Self {
            slots: (0..slot_count).map(|_| Vec::new()).collect(),
            tick_ms,
            current_pos: 0,
            key_index: HashMap::new(),
        }
    }

    /// Adds or reschedules a key, smearing its deadline.
    pub fn add(&mut self, key: &str, expire_at_ms: i64, now_ms: i64) {
        let smear = rand::rng().random_range(-(self.tick_ms / 4)..=self.tick_ms / 4);
        let expire_at_ms = expire_at_ms + smear;

        let delay = (expire_at_ms - now_ms).max(0);
        let ticks = delay / self.tick_ms;
        let slot = (self.current_pos + ticks as usize) % self.slots.len();
        let rounds = ticks / self.slots.len() as i64;

        self.remove(key);

        self.slots[slot].push(WheelEntry {
            key: key.to_string(),
            expire_at_ms,
            rounds,
        });
        self.key_index.insert(key.to_string(), slot);
    }

    /// Removes a key if present. A no-op for unknown keys.
    pub fn remove(&mut self, key: &str) {
        let Some(slot) = self.key_index.remove(key) else {
            return;
        };
        if let Some(pos) = self.slots[slot].iter().position(|e| e.key == key) {
            self.slots[slot].swap_remove(pos);
        }
    }

    /// Advances the wheel one slot, returning the keys that expired.
    ///
    /// Entries with remaining rounds stay in the slot with their counter
    /// decremented; entries whose smeared deadline is still in the future
    /// stay untouched and fire on a later revolution.
    pub fn advance(&mut self, now_ms: i64) -> Vec<String> {
        let pos = self.current_pos;
        let mut expired = Vec::new();
        let mut remaining = Vec::new();

        for mut entry in self.slots[pos].drain(..) {
            if entry.rounds > 0 {
                entry.rounds -= 1;
                remaining.push(entry);
            } else if entry.expire_at_ms <= now_ms {
                self.key_index.remove(&entry.key);
                expired.push(entry.key);
            } else {
                remaining.push(entry);
            }
        }

        self.slots[pos] = remaining;
        self.current_pos = (pos + 1) % self.slots.len();
        expired
    }

    pub fn len(&self) -> usize {
        self.key_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_clamps() {
        let w = HashedWheel::new(1, 5);
        assert_eq!(w.slots.len(), MIN_SLOTS);
        assert_eq!(w.tick_ms, MIN_TICK_MS);

        let w = HashedWheel::new(1_000_000, 10_000);
        assert_eq!(w.slots.len(), MAX_SLOTS);
        assert_eq!(w.tick_ms, MAX_TICK_MS);
    }

    #[test]
    fn test_past_deadline_expires_on_first_advance() {
        let mut w = HashedWheel::new(64, 100);
        // Deadline well in the past: even with smear it lands on the
        // current slot with zero rounds.
        w.add("old", -10_000, 0);
        let expired = w.advance(0);
        assert_eq!(expired, vec!["old".to_string()]);
        assert!(w.is_empty());
    }

    #[test]
    fn test_future_deadline_waits_for_its_slot() {
        let mut w = HashedWheel::new(64, 100);
        // ~10 ticks out (smear is at most a quarter tick either way)
        w.add("k", 1_000, 0);
        assert!(w.advance(0).is_empty());
        assert_eq!(w.len(), 1);

        // Sweep a full revolution at a time far past the deadline
        let mut fired = Vec::new();
        for _ in 0..64 {
            fired.extend(w.advance(100_000));
        }
        assert_eq!(fired, vec!["k".to_string()]);
        assert!(w.is_empty());
    }

    #[test]
    fn test_rounds_survive_one_revolution() {
        let mut w = HashedWheel::new(64, 100);
        // 64 slots * 100ms = 6.4s per revolution; 10s needs a second lap
        w.add("far", 10_000, 0);

        let mut first_lap = Vec::new();
        for _ in 0..64 {
            first_lap.extend(w.advance(100_000));
        }
        assert!(first_lap.is_empty(), "survived entries must wait a lap");

        let mut second_lap = Vec::new();
        for _ in 0..64 {
            second_lap.extend(w.advance(100_000));
        }
        assert_eq!(second_lap, vec!["far".to_string()]);
    }

    #[test]
    fn test_remove_cancels() {
        let mut w = HashedWheel::new(64, 100);
        w.add("k", 500, 0);
        w.remove("k");
        assert!(w.is_empty());

        for _ in 0..64 {
            assert!(w.advance(100_000).is_empty());
        }
    }

    #[test]
    fn test_readd_replaces() {
        let mut w = HashedWheel::new(64, 100);
        w.add("k", 500, 0);
        w.add("k", 3_000, 0);
        assert_eq!(w.len(), 1);
    }
}
