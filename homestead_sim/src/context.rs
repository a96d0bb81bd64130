// Explicit simulation context threaded through every tick.
//
// `SimContext` bundles the three pieces of process-wide mutable state the
// simulation needs: the clock (`tick`, `speed`), the frame-seeded random
// source, and the tick's checksum accumulator. Passing it explicitly instead
// of reading globals makes replay and checksum-recalculation paths testable
// in isolation: two contexts built from the same seed are two independent,
// identical simulations.
//
// Every random draw made through the context is also fed into the checksum,
// so any divergence in how many draws a tick makes, or in their values,
// shows up as a checksum mismatch.
//
// See also: `homestead_prng::RandomSource` for the frame-seed chain,
// `checksum.rs` for the accumulator, `handler.rs` which calls `begin_tick` /
// `end_tick` around each tick.

use crate::checksum::ChecksumAccumulator;
use crate::prng::RandomSource;
use crate::types::SimSpeed;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimContext {
    /// The tick that will run next (equivalently: number of finished ticks).
    pub tick: u64,
    pub speed: SimSpeed,
    random: RandomSource,
    /// Tick-local; always empty between ticks, so never persisted.
    #[serde(skip)]
    checksum: ChecksumAccumulator,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            tick: 0,
            speed: SimSpeed::Normal,
            random: RandomSource::new(seed),
            checksum: ChecksumAccumulator::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.speed == SimSpeed::Paused
    }

    pub fn frame_seed(&self) -> u64 {
        self.random.frame_seed()
    }

    /// Reseed the random source for the tick about to run.
    pub fn begin_tick(&mut self) {
        self.random.begin_frame();
    }

    /// Chain the next frame seed, clear the accumulator and advance the
    /// clock.
    pub fn end_tick(&mut self) {
        self.random.end_frame();
        self.checksum.reset();
        self.tick += 1;
    }

    /// Uniform draw in `[low, high)`, fed into the checksum.
    pub fn random_range(&mut self, low: u64, high: u64) -> u64 {
        let value = self.random.range_u64(low, high);
        self.checksum.feed_u64(value);
        value
    }

    /// Weighted coin flip, fed into the checksum.
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        let hit = self.random.chance(numerator, denominator);
        self.checksum.feed_u32(hit as u32);
        hit
    }

    /// Feed an observation (event marker, selected index, ...) into the
    /// checksum without drawing.
    pub fn observe(&mut self, value: u32) {
        self.checksum.feed_u32(value);
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.value()
    }

    pub fn checksum_feeds(&self) -> u32 {
        self.checksum.fed()
    }
}
