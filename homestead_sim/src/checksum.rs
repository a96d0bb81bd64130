// Per-tick checksums for desync detection.
//
// Three pieces:
// - `ChecksumAccumulator`: folds every value the simulation feeds it during
//   one tick (random draws, order-sensitive selections, production markers)
//   through CRC-32. It is reset at the end of each tick; an accumulator that
//   saw nothing reads 0.
// - `ChecksumTable`: the recorded checksum of every finished tick. Stored as
//   `first_tick` + values so a compact save can `purge()` the history and
//   recording keeps going append-only from the purge point.
// - `ChecksumPolicy`: what a replay does with the table: verify against it,
//   repair (overwrite) it after an intentional logic change, or ignore it.
//
// Invariant while recording: `first_tick + values.len()` equals the number
// of ticks that have started, i.e. every finished tick from `first_tick` on
// has exactly one entry.
//
// See also: `handler.rs` which opens, finalizes and verifies slots,
// `context.rs` which owns the accumulator, `journal.rs` which persists the
// table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a replay does with recorded checksums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumPolicy {
    /// Compare each tick against the table; a mismatch is a fatal desync.
    Verify,
    /// Overwrite the table with freshly computed values.
    Repair,
    /// Neither compare nor write.
    Off,
}

/// Tick-local CRC-32 over everything the simulation chose to observe.
#[derive(Clone, Default)]
pub struct ChecksumAccumulator {
    hasher: crc32fast::Hasher,
    fed: u32,
}

impl fmt::Debug for ChecksumAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumAccumulator")
            .field("value", &self.value())
            .field("fed", &self.fed)
            .finish()
    }
}

impl ChecksumAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_u32(&mut self, value: u32) {
        self.hasher.update(&value.to_le_bytes());
        self.fed += 1;
    }

    pub fn feed_u64(&mut self, value: u64) {
        self.hasher.update(&value.to_le_bytes());
        self.fed += 1;
    }

    pub fn feed_i32(&mut self, value: i32) {
        self.feed_u32(value as u32);
    }

    /// Current checksum of everything fed since the last reset.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Number of values fed since the last reset.
    pub fn fed(&self) -> u32 {
        self.fed
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Checksum of every recorded tick, indexed by absolute tick number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumTable {
    first_tick: u64,
    values: Vec<u32>,
}

impl ChecksumTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// First tick that has (or will have) an entry.
    pub fn first_tick(&self) -> u64 {
        self.first_tick
    }

    /// One past the last tick with an entry.
    pub fn end_tick(&self) -> u64 {
        self.first_tick + self.values.len() as u64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, tick: u64) -> Option<u32> {
        if tick < self.first_tick {
            return None;
        }
        self.values.get((tick - self.first_tick) as usize).copied()
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Append an unfinalized slot for `tick`. Panics unless `tick` is
    /// exactly the next tick the table expects.
    pub fn open_slot(&mut self, tick: u64) {
        assert_eq!(
            self.end_tick(),
            tick,
            "checksum table out of step: expected slot for tick {}, got {}",
            self.end_tick(),
            tick
        );
        self.values.push(0);
    }

    /// Write the checksum for an existing slot. Panics if `tick` has no slot.
    pub fn set(&mut self, tick: u64, value: u32) {
        let index = tick
            .checked_sub(self.first_tick)
            .map(|i| i as usize)
            .filter(|&i| i < self.values.len());
        match index {
            Some(i) => self.values[i] = value,
            None => panic!("no checksum slot for tick {tick}"),
        }
    }

    /// Drop every entry for ticks `>= tick`.
    pub fn truncate(&mut self, tick: u64) {
        if tick <= self.first_tick {
            self.values.clear();
            self.first_tick = self.first_tick.min(tick);
            return;
        }
        let keep = (tick - self.first_tick) as usize;
        self.values.truncate(keep);
    }

    /// Forget all recorded history. Recording resumes at `next_tick`.
    pub fn purge(&mut self, next_tick: u64) {
        self.values.clear();
        self.first_tick = next_tick;
    }
}
