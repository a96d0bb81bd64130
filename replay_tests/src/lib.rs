// Test-only colony harness for record/replay integration tests.
//
// Bundles the pieces a game loop owns (a `ColonyWorld`, a `SimContext`, an
// `OperationHandler`) plus a copy of the starting world, and exposes a
// synchronous, test-friendly API over them: run N ticks, save the session as
// journal JSON, load a journal and replay it to the end. All simulation and
// replay logic uses the same code paths as the real game; the only
// test-specific code is the bookkeeping here.
//
// See also: `tests/record_replay.rs` for the integration test scenarios.

use homestead_sim::checksum::ChecksumPolicy;
use homestead_sim::config::GameConfig;
use homestead_sim::context::SimContext;
use homestead_sim::event::{OperationEvent, TickReport};
use homestead_sim::handler::{OperationHandler, TickHook};
use homestead_sim::journal::ReplayJournal;
use homestead_sim::types::{StructureKind, TileCoord};
use homestead_sim::world::ColonyWorld;

/// Upper bound on ticks `finish_replay` will run before giving up.
const REPLAY_TICK_LIMIT: u64 = 100_000;

// Standard village layout, see `build_village`.
pub const FLAG_A: TileCoord = TileCoord::new(4, 4);
pub const FLAG_B: TileCoord = TileCoord::new(4, 10);
pub const FLAG_C: TileCoord = TileCoord::new(10, 4);
pub const FLAG_D: TileCoord = TileCoord::new(10, 10);
pub const FLAG_G: TileCoord = TileCoord::new(16, 15);
pub const FLAG_H: TileCoord = TileCoord::new(20, 20);
pub const FLAG_I: TileCoord = TileCoord::new(20, 24);
pub const WOODCUTTER: TileCoord = TileCoord::new(3, 4);
pub const STOCK: TileCoord = TileCoord::new(3, 10);
pub const SAWMILL: TileCoord = TileCoord::new(9, 10);
pub const GUARD_HOUSE: TileCoord = TileCoord::new(15, 15);

/// A colony under test: live state plus the world it started from.
pub struct TestColony {
    pub initial: ColonyWorld,
    pub world: ColonyWorld,
    pub ctx: SimContext,
    pub ops: OperationHandler,
    /// Every tick report since the colony was created or loaded.
    pub reports: Vec<TickReport>,
}

impl TestColony {
    /// Empty colony on the default config.
    pub fn new(seed: u64) -> Self {
        Self::with_config(GameConfig::default(), seed)
    }

    pub fn with_config(config: GameConfig, seed: u64) -> Self {
        let world = ColonyWorld::new(config);
        let ctx = SimContext::new(seed);
        let ops = OperationHandler::new(&world.config, &ctx);
        Self {
            initial: world.clone(),
            world,
            ctx,
            ops,
            reports: Vec::new(),
        }
    }

    /// Start replaying `json` on top of `initial`. The colony is in replay
    /// mode until `finish_replay` (or enough `run`) brings it level.
    pub fn load(initial: ColonyWorld, json: &str, policy: ChecksumPolicy) -> Self {
        let journal = ReplayJournal::from_json(json).expect("journal failed to parse");
        let (ops, ctx) = OperationHandler::load_and_replay(journal, &initial.config, policy);
        Self {
            world: initial.clone(),
            initial,
            ctx,
            ops,
            reports: Vec::new(),
        }
    }

    /// Journal JSON for this session so far.
    pub fn save(&self) -> String {
        self.ops.journal().to_json().expect("journal failed to serialize")
    }

    /// Save, then replay the save from scratch under `policy`.
    pub fn reload(&self, policy: ChecksumPolicy) -> Self {
        let mut loaded = Self::load(self.initial.clone(), &self.save(), policy);
        loaded.finish_replay();
        loaded
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            let report = self.ops.advance(&mut self.world, &mut self.ctx);
            self.reports.push(report);
        }
    }

    pub fn run_with<H: TickHook>(&mut self, ticks: u64, hook: &mut H) {
        for _ in 0..ticks {
            let report = self.ops.advance_with(&mut self.world, &mut self.ctx, hook);
            self.reports.push(report);
        }
    }

    /// Run until the clock reads `tick`.
    pub fn run_until(&mut self, tick: u64) {
        assert!(self.ctx.tick <= tick, "already past tick {tick}");
        self.run(tick - self.ctx.tick);
    }

    /// Advance until the replay catches up and recording resumes.
    pub fn finish_replay(&mut self) {
        let start = self.ctx.tick;
        while self.ops.is_replaying() {
            assert!(
                self.ctx.tick - start < REPLAY_TICK_LIMIT,
                "replay did not finish within {REPLAY_TICK_LIMIT} ticks"
            );
            self.run(1);
        }
    }

    pub fn undo(&mut self) -> Vec<OperationEvent> {
        self.ops.undo(&mut self.world, &self.ctx)
    }

    pub fn redo(&mut self) -> Vec<OperationEvent> {
        self.ops.redo(&mut self.world, &self.ctx)
    }

    /// All events from all recorded reports, in order.
    pub fn events(&self) -> impl Iterator<Item = &OperationEvent> {
        self.reports.iter().flat_map(|r| &r.events)
    }

    /// Schedule the standard village at the current tick:
    ///
    /// ```text
    ///  A(4,4) ──────── C(10,4)
    ///    │               │
    ///  B(4,10)         D(10,10)        G(16,15)    H(20,20) ── I(20,24)
    /// ```
    ///
    /// with a woodcutter on A, a stock on B, a sawmill on D and a guard house
    /// on G. Items flow from the woodcutter along the roads.
    pub fn build_village(&mut self) {
        let (world, ctx, ops) = (&self.world, &self.ctx, &mut self.ops);
        for flag in [FLAG_A, FLAG_B, FLAG_C, FLAG_D, FLAG_G, FLAG_H, FLAG_I] {
            ops.schedule_create_flag(world, ctx, flag);
        }
        ops.schedule_create_road(world, ctx, column(4, 4, 10));
        ops.schedule_create_road(world, ctx, row(4, 4, 10));
        ops.schedule_create_road(world, ctx, column(10, 4, 10));
        ops.schedule_create_road(world, ctx, column(20, 20, 24));
        ops.schedule_create_structure(ctx, StructureKind::Woodcutter, WOODCUTTER);
        ops.schedule_create_structure(ctx, StructureKind::Stock, STOCK);
        ops.schedule_create_structure(ctx, StructureKind::Sawmill, SAWMILL);
        ops.schedule_create_structure(ctx, StructureKind::GuardHouse, GUARD_HOUSE);
    }
}

/// Tiles `(x, y0..=y1)`.
pub fn column(x: i32, y0: i32, y1: i32) -> Vec<TileCoord> {
    (y0..=y1).map(|y| TileCoord::new(x, y)).collect()
}

/// Tiles `(x0..=x1, y)`.
pub fn row(y: i32, x0: i32, x1: i32) -> Vec<TileCoord> {
    (x0..=x1).map(|x| TileCoord::new(x, y)).collect()
}
