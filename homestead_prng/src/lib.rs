// Deterministic, portable pseudo-random numbers for the colony simulation.
//
// Two layers live here:
// - `GameRng`: xoshiro256++ (Blackman & Vigna, 2019) seeded through
//   SplitMix64. Hand-rolled so the output stream is identical on every
//   platform and compiler.
// - `RandomSource`: the sim's single random stream. It is reseeded at the
//   start of every tick from a *frame seed*, and the next frame seed is drawn
//   from the stream at the end of the tick. The frame seeds therefore form a
//   hash chain: knowing the seed of tick N (one `u64`) is enough to reproduce
//   every draw from tick N onward, which is what lets a save file store the
//   RNG as a single integer.
//
// See also: `homestead_sim::context` which owns the `RandomSource` and feeds
// every draw into the tick checksum.
//
// **Critical constraint: determinism.** Every method must produce identical
// output given the same prior state. No floating-point arithmetic in the core
// generator, no stdlib PRNG, no OS entropy.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ generator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRng {
    s: [u64; 4],
}

impl GameRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Two `GameRng` instances created with the same seed produce identical
    /// output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Upper 32 bits of the next `u64`.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform integer in `[low, high)`, rejection-sampled to avoid modulo
    /// bias. Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Returns `true` with probability `numerator / denominator`.
    ///
    /// Integer-only so the decision never depends on float rounding.
    /// Panics if `denominator == 0`.
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        assert!(denominator > 0, "chance: denominator must be positive");
        if numerator >= denominator {
            return true;
        }
        self.range_u64(0, denominator as u64) < numerator as u64
    }
}

/// SplitMix64, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

// ---------------------------------------------------------------------------
// Frame-seeded random source
// ---------------------------------------------------------------------------

/// The simulation's sole random stream, chained tick to tick through frame
/// seeds.
///
/// Only `frame_seed` is persisted. The live generator is rebuilt from it by
/// `begin_frame()`, so a source restored from a save between ticks behaves
/// exactly like the one that was saved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomSource {
    frame_seed: u64,
    #[serde(skip, default = "idle_rng")]
    rng: GameRng,
}

fn idle_rng() -> GameRng {
    GameRng::new(0)
}

impl RandomSource {
    /// Start a chain whose first frame uses `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            frame_seed: seed,
            rng: GameRng::new(seed),
        }
    }

    /// The seed the next (or current) frame was started from.
    pub fn frame_seed(&self) -> u64 {
        self.frame_seed
    }

    /// Reseed the generator from the current frame seed. Called once at the
    /// start of every tick.
    pub fn begin_frame(&mut self) {
        self.rng = GameRng::new(self.frame_seed);
    }

    /// Draw the next frame seed from the stream. Called once at the end of
    /// every tick; returns the new seed.
    pub fn end_frame(&mut self) -> u64 {
        self.frame_seed = self.rng.next_u64();
        self.frame_seed
    }

    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        self.rng.range_u64(low, high)
    }

    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        self.rng.chance(numerator, denominator)
    }
}
