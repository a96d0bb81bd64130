// The operation handler: scheduler, history keeper and desync detector.
//
// `OperationHandler` owns everything about operations that is not the
// operations themselves: the log and its execution cursor, the undo and redo
// stacks, the group counter, the checksum table, and the recording/replaying
// mode. Producers (UI, planner) only ever call the `schedule_*` helpers,
// `start_group()`, `undo()` and `redo()`; the owning game loop calls
// `advance()` once per tick.
//
// Per tick (`advance_with`):
//   1. Reseed the random source (`SimContext::begin_tick`).
//   2. Open this tick's checksum slot (recording) or look up the recorded
//      value (replaying).
//   3. Run the world update, then the `TickHook`. Operations scheduled from
//      inside the hook are deferred to the next tick unless paused.
//   4. Drain the log: execute every entry scheduled for this tick, in log
//      order. A failed operation is reported and skipped.
//   5. Record, verify or repair the tick's checksum. A mismatch under
//      `ChecksumPolicy::Verify` is a desync and panics.
//   6. Chain the next frame seed, reset the accumulator, advance the clock.
//   7. If replaying and the clock is back where recording left off, resume
//      recording.
//
// Undo and redo execute immediately, outside any tick. So that a replay sees
// them at the same point between world updates, each step is also written
// into the log at the cursor, stamped with the tick that just finished, and
// the cursor steps past it. Replaying such an entry pops the matching
// inverse off its stack, so a replay from the start rebuilds both history
// stacks exactly.
//
// Replay: `start_replay()` rewinds the cursor and marks the current clock as
// the point where recording resumes; the caller supplies a world and context
// restored to that log position. A producer action during replay (schedule,
// undo, redo) first cancels the replay: the unreplayed part of the log and
// checksum table is discarded and the replayed state becomes the present.
// Operations the hook schedules during a replayed tick are dropped, since
// the log already holds what the hook scheduled when the tick was recorded.
//
// See also: `operation.rs` for execute-and-invert, `log.rs` for the log,
// `checksum.rs` for the table and policy, `journal.rs` for persistence,
// `context.rs` for the clock and random source.
//
// **Critical constraint: determinism.** The handler itself never draws
// random numbers or feeds the checksum. Everything that depends on the
// order of operations goes through the log, so that order is recorded.

use crate::checksum::{ChecksumPolicy, ChecksumTable};
use crate::config::GameConfig;
use crate::context::SimContext;
use crate::event::{OperationEvent, OperationEventKind, TickReport};
use crate::journal::{FORMAT_VERSION, ReplayJournal};
use crate::log::OperationLog;
use crate::operation::{Operation, OperationKind, Source};
use crate::types::{Area, GroupId, ItemKind, StructureKind, TileCoord};
use crate::world::ColonyWorld;
use tracing::{debug, error, info, warn};

/// Called once per tick between the world update and the log drain, with
/// the handler available for scheduling.
pub trait TickHook {
    fn on_tick(&mut self, world: &mut ColonyWorld, ctx: &mut SimContext, ops: &mut OperationHandler);
}

impl<F> TickHook for F
where
    F: FnMut(&mut ColonyWorld, &mut SimContext, &mut OperationHandler),
{
    fn on_tick(&mut self, world: &mut ColonyWorld, ctx: &mut SimContext, ops: &mut OperationHandler) {
        self(world, ctx, ops)
    }
}

/// The hook `advance()` uses: does nothing.
pub struct NoHook;

impl TickHook for NoHook {
    fn on_tick(&mut self, _: &mut ColonyWorld, _: &mut SimContext, _: &mut OperationHandler) {}
}

/// Parameters of an active replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayWindow {
    pub policy: ChecksumPolicy,
    /// Log index the replay started from.
    pub from: usize,
    /// Tick at which recording resumes.
    pub end_tick: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerMode {
    Recording,
    Replaying(ReplayWindow),
}

/// What step 5 does with this tick's checksum.
enum ChecksumSlot {
    Untracked,
    Record,
    Verify(u32),
    Repair(u32),
}

#[derive(Clone, Debug)]
pub struct OperationHandler {
    log: OperationLog,
    /// Index of the next log entry to execute.
    cursor: usize,
    undo_stack: Vec<Operation>,
    redo_stack: Vec<Operation>,
    /// Last group id handed out.
    group_counter: u32,
    checksums: ChecksumTable,
    record_checksums: bool,
    /// Tick and frame seed recording started from.
    start_tick: u64,
    initial_seed: u64,
    /// Next tick to run, as far as recording is concerned.
    clock: u64,
    mode: HandlerMode,
    inside_frame: bool,
}

impl OperationHandler {
    /// Start recording from `ctx`'s current tick.
    pub fn new(config: &GameConfig, ctx: &SimContext) -> Self {
        let mut checksums = ChecksumTable::new();
        checksums.purge(ctx.tick);
        Self {
            log: OperationLog::new(),
            cursor: 0,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            group_counter: 0,
            checksums,
            record_checksums: config.record_checksums,
            start_tick: ctx.tick,
            initial_seed: ctx.frame_seed(),
            clock: ctx.tick,
            mode: HandlerMode::Recording,
            inside_frame: false,
        }
    }

    /// Restore a handler from a journal, in recording mode, positioned at
    /// the end of the recorded log. History stacks are empty; use
    /// `load_and_replay` to rebuild them along with the world.
    ///
    /// A checksum table that does not reach the journal's end (recorded
    /// without checksums, or cut short) is purged when this config records
    /// checksums, so recording restarts at the resume point.
    pub fn from_journal(journal: ReplayJournal, config: &GameConfig) -> Self {
        let highest = journal.log.max_forward_group().map_or(0, |g| g.0);
        let mut checksums = journal.checksums;
        if config.record_checksums && checksums.end_tick() != journal.end_tick {
            debug!(
                first_tick = checksums.first_tick(),
                table_end = checksums.end_tick(),
                end_tick = journal.end_tick,
                "checksum table does not reach the journal end, purged"
            );
            checksums.purge(journal.end_tick);
        }
        Self {
            cursor: journal.log.len(),
            log: journal.log,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            group_counter: journal.group_counter.max(highest),
            checksums,
            record_checksums: config.record_checksums,
            start_tick: journal.start_tick,
            initial_seed: journal.initial_seed,
            clock: journal.end_tick,
            mode: HandlerMode::Recording,
            inside_frame: false,
        }
    }

    /// Restore a handler from a journal and start replaying it from the
    /// beginning. Returns the handler and a context positioned at the
    /// journal's start; the caller pairs them with the world as it was when
    /// recording started, and advances until `is_replaying()` turns false.
    pub fn load_and_replay(
        journal: ReplayJournal,
        config: &GameConfig,
        policy: ChecksumPolicy,
    ) -> (Self, SimContext) {
        let mut ctx = SimContext::new(journal.initial_seed);
        ctx.tick = journal.start_tick;
        let mut handler = Self::from_journal(journal, config);
        handler.start_replay(0, policy, &ctx);
        (handler, ctx)
    }

    /// Snapshot of everything needed to replay this session.
    pub fn journal(&self) -> ReplayJournal {
        let end_tick = match self.mode {
            HandlerMode::Recording => self.clock,
            HandlerMode::Replaying(window) => window.end_tick.max(self.clock),
        };
        ReplayJournal {
            format_version: FORMAT_VERSION,
            start_tick: self.start_tick,
            initial_seed: self.initial_seed,
            end_tick,
            group_counter: self.group_counter,
            log: self.log.clone(),
            checksums: self.checksums.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn undo_stack(&self) -> &[Operation] {
        &self.undo_stack
    }

    pub fn redo_stack(&self) -> &[Operation] {
        &self.redo_stack
    }

    pub fn checksums(&self) -> &ChecksumTable {
        &self.checksums
    }

    pub fn mode(&self) -> HandlerMode {
        self.mode
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.mode, HandlerMode::Replaying(_))
    }

    pub fn is_inside_frame(&self) -> bool {
        self.inside_frame
    }

    pub fn group_counter(&self) -> u32 {
        self.group_counter
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Allocate a fresh group id for a cascade. Schedule each step with
    /// `op.in_group(group)` and `standalone == false`.
    pub fn start_group(&mut self) -> GroupId {
        self.group_counter += 1;
        let group = GroupId(self.group_counter);
        assert!(group.is_forward(), "group counter exhausted");
        group
    }

    /// Append `op` to the log. A standalone operation gets a fresh group;
    /// otherwise it keeps the group the caller set. Returns the group.
    ///
    /// The operation runs at the current tick, or at the next one when
    /// scheduled from inside a running (unpaused) tick.
    ///
    /// Inside a replayed tick the operation is dropped and no group is
    /// allocated. The returned id is then `op.group` unchanged, which for a
    /// standalone operation is `GroupId::NONE`.
    pub fn schedule(&mut self, mut op: Operation, standalone: bool, ctx: &SimContext) -> GroupId {
        if self.drops_schedules() {
            debug!(
                tick = ctx.tick,
                op = op.kind.name(),
                "schedule during replayed tick dropped"
            );
            return op.group;
        }
        if self.is_replaying() {
            self.cancel_replay(ctx);
        }

        if standalone {
            op.group = self.start_group();
        } else {
            assert!(
                op.group.is_forward(),
                "{} scheduled as part of a cascade without a group",
                op.kind.name()
            );
        }
        op.source = Source::Manual;
        op.scheduled_tick = if self.inside_frame && !ctx.is_paused() {
            ctx.tick + 1
        } else {
            ctx.tick
        };
        debug!(
            tick = ctx.tick,
            at = op.scheduled_tick,
            op = op.kind.name(),
            group = %op.group,
            "scheduled"
        );
        let group = op.group;
        self.log.append(op);
        group
    }

    fn schedule_kind(&mut self, kind: OperationKind, ctx: &SimContext) -> GroupId {
        self.schedule(Operation::new(kind), true, ctx)
    }

    pub fn schedule_create_structure(
        &mut self,
        ctx: &SimContext,
        kind: StructureKind,
        anchor: TileCoord,
    ) -> GroupId {
        self.schedule_kind(
            OperationKind::CreateStructure {
                kind,
                anchor,
                state: None,
            },
            ctx,
        )
    }

    pub fn schedule_remove_structure(&mut self, ctx: &SimContext, anchor: TileCoord) -> GroupId {
        self.schedule_kind(OperationKind::RemoveStructure { anchor }, ctx)
    }

    /// Lay a road along `path` with the configured default priority and
    /// hauler count.
    pub fn schedule_create_road(
        &mut self,
        world: &ColonyWorld,
        ctx: &SimContext,
        path: Vec<TileCoord>,
    ) -> GroupId {
        self.schedule_kind(
            OperationKind::CreateRoad {
                path,
                priority: world.config.default_road_priority,
                haulers: world.config.default_road_haulers,
            },
            ctx,
        )
    }

    pub fn schedule_remove_road(&mut self, ctx: &SimContext, at: TileCoord) -> GroupId {
        self.schedule_kind(OperationKind::RemoveRoad { at }, ctx)
    }

    /// Whether a schedule right now would be dropped. Cascade helpers check
    /// this before allocating a group, so a replayed tick leaves the group
    /// counter where recording left it.
    fn drops_schedules(&self) -> bool {
        self.inside_frame && self.is_replaying()
    }

    /// Place a flag. Placed on a road, it also splits the road there; both
    /// steps undo together. Returns `GroupId::NONE` when dropped during a
    /// replayed tick.
    pub fn schedule_create_flag(
        &mut self,
        world: &ColonyWorld,
        ctx: &SimContext,
        at: TileCoord,
    ) -> GroupId {
        if self.drops_schedules() {
            debug!(tick = ctx.tick, %at, "create flag during replayed tick dropped");
            return GroupId::NONE;
        }
        let group = self.start_group();
        self.schedule(
            Operation::new(OperationKind::CreateFlag { at, items: 0 }).in_group(group),
            false,
            ctx,
        );
        if world.road(at).is_some() {
            self.schedule(
                Operation::new(OperationKind::CaptureRoads {
                    flag: at,
                    release: false,
                })
                .in_group(group),
                false,
                ctx,
            );
        }
        group
    }

    /// Remove a flag and everything anchored to it: the structure it serves,
    /// then every road ending there, then the flag itself, as one undo step.
    pub fn schedule_remove_flag(
        &mut self,
        world: &ColonyWorld,
        ctx: &SimContext,
        at: TileCoord,
    ) -> GroupId {
        if self.drops_schedules() {
            debug!(tick = ctx.tick, %at, "remove flag during replayed tick dropped");
            return GroupId::NONE;
        }
        let group = self.start_group();
        let mut steps = Vec::new();
        if let Some(anchor) = world.structure_at_entrance(at) {
            steps.push(OperationKind::RemoveStructure { anchor });
        }
        for road in world.roads_ending_at(at) {
            steps.push(OperationKind::RemoveRoad { at: road });
        }
        steps.push(OperationKind::RemoveFlag { at });
        for kind in steps {
            self.schedule(Operation::new(kind).in_group(group), false, ctx);
        }
        group
    }

    pub fn schedule_capture_roads(
        &mut self,
        ctx: &SimContext,
        flag: TileCoord,
        release: bool,
    ) -> GroupId {
        self.schedule_kind(OperationKind::CaptureRoads { flag, release }, ctx)
    }

    pub fn schedule_change_area(
        &mut self,
        ctx: &SimContext,
        anchor: TileCoord,
        area: Option<Area>,
    ) -> GroupId {
        self.schedule_kind(OperationKind::ChangeMonitoredArea { anchor, area }, ctx)
    }

    pub fn schedule_move_flag(&mut self, ctx: &SimContext, from: TileCoord, to: TileCoord) -> GroupId {
        self.schedule_kind(OperationKind::MoveFlag { from, to }, ctx)
    }

    pub fn schedule_move_road_segment(
        &mut self,
        ctx: &SimContext,
        from: TileCoord,
        to: TileCoord,
    ) -> GroupId {
        self.schedule_kind(OperationKind::MoveRoadSegment { from, to }, ctx)
    }

    pub fn schedule_route_priority(
        &mut self,
        ctx: &SimContext,
        at: TileCoord,
        priority: i8,
    ) -> GroupId {
        self.schedule_kind(OperationKind::ChangeRoutePriority { at, priority }, ctx)
    }

    pub fn schedule_worker_count(
        &mut self,
        ctx: &SimContext,
        anchor: TileCoord,
        workers: u8,
    ) -> GroupId {
        self.schedule_kind(OperationKind::ChangeWorkerCount { anchor, workers }, ctx)
    }

    pub fn schedule_stock_adjustment(
        &mut self,
        ctx: &SimContext,
        anchor: TileCoord,
        item: ItemKind,
        low: u16,
        high: u16,
    ) -> GroupId {
        self.schedule_kind(
            OperationKind::AdjustStockThresholds {
                anchor,
                item,
                low,
                high,
            },
            ctx,
        )
    }

    pub fn schedule_input_buffer(
        &mut self,
        ctx: &SimContext,
        anchor: TileCoord,
        enabled: bool,
    ) -> GroupId {
        self.schedule_kind(OperationKind::ToggleInputBuffer { anchor, enabled }, ctx)
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    /// Undo the most recent group. Runs immediately.
    pub fn undo(&mut self, world: &mut ColonyWorld, ctx: &SimContext) -> Vec<OperationEvent> {
        self.step_history(Source::Undo, world, ctx)
    }

    /// Redo the most recently undone group. Runs immediately.
    pub fn redo(&mut self, world: &mut ColonyWorld, ctx: &SimContext) -> Vec<OperationEvent> {
        self.step_history(Source::Redo, world, ctx)
    }

    fn history(&self, source: Source) -> &Vec<Operation> {
        match source {
            Source::Redo => &self.redo_stack,
            Source::Manual | Source::Undo => &self.undo_stack,
        }
    }

    fn history_mut(&mut self, source: Source) -> &mut Vec<Operation> {
        match source {
            Source::Redo => &mut self.redo_stack,
            Source::Manual | Source::Undo => &mut self.undo_stack,
        }
    }

    /// Pop and execute entries from one stack while they share the group of
    /// the first one popped.
    fn step_history(
        &mut self,
        stack: Source,
        world: &mut ColonyWorld,
        ctx: &SimContext,
    ) -> Vec<OperationEvent> {
        assert!(!self.inside_frame, "undo/redo requested from inside a tick");
        let mut events = Vec::new();
        if self.history(stack).is_empty() {
            return events;
        }
        if self.is_replaying() {
            self.cancel_replay(ctx);
        }

        let tick = ctx.tick.saturating_sub(1);
        while let Some(mut op) = self.history_mut(stack).pop() {
            let group = op.group;
            op.scheduled_tick = tick;
            self.log.insert_at(self.cursor, op.clone());
            self.cursor += 1;
            self.execute(&op, world, tick, &mut events);
            if self
                .history(stack)
                .last()
                .is_none_or(|next| next.group != group)
            {
                break;
            }
        }
        events
    }

    // -----------------------------------------------------------------------
    // Tick processing
    // -----------------------------------------------------------------------

    /// Run one tick.
    pub fn advance(&mut self, world: &mut ColonyWorld, ctx: &mut SimContext) -> TickReport {
        self.advance_with(world, ctx, &mut NoHook)
    }

    /// Run one tick, calling `hook` after the world update.
    pub fn advance_with<H: TickHook + ?Sized>(
        &mut self,
        world: &mut ColonyWorld,
        ctx: &mut SimContext,
        hook: &mut H,
    ) -> TickReport {
        assert!(!self.inside_frame, "advance called from inside a tick");
        let tick = ctx.tick;
        ctx.begin_tick();
        self.inside_frame = true;
        let slot = self.open_checksum_slot(tick);

        world.update(ctx);
        hook.on_tick(world, ctx, self);

        let mut events = Vec::new();
        while let Some(next) = self.log.get(self.cursor) {
            assert!(
                next.scheduled_tick >= tick,
                "operation log behind the clock: entry {} scheduled for tick {} still pending at tick {}",
                self.cursor,
                next.scheduled_tick,
                tick
            );
            if next.scheduled_tick > tick {
                break;
            }
            let op = next.clone();
            self.cursor += 1;
            if op.source != Source::Manual {
                self.retire_journaled(&op);
            }
            self.execute(&op, world, tick, &mut events);
        }

        let checksum = ctx.checksum();
        self.close_checksum_slot(tick, slot, checksum, &mut events);
        self.inside_frame = false;
        ctx.end_tick();
        self.clock = ctx.tick;

        if let HandlerMode::Replaying(window) = self.mode
            && ctx.tick >= window.end_tick
        {
            self.mode = HandlerMode::Recording;
            info!(tick = ctx.tick, cursor = self.cursor, "replay finished");
            events.push(OperationEvent {
                tick,
                kind: OperationEventKind::ReplayFinished,
            });
        }

        TickReport {
            tick,
            checksum,
            events,
        }
    }

    fn execute(
        &mut self,
        op: &Operation,
        world: &mut ColonyWorld,
        tick: u64,
        events: &mut Vec<OperationEvent>,
    ) {
        let Some(inverse) = op.execute_and_invert(world) else {
            if op.source == Source::Manual {
                warn!(tick, op = op.kind.name(), group = %op.group, "operation no longer applies");
            } else {
                debug!(tick, op = op.kind.name(), group = %op.group, source = ?op.source, "history step no longer applies");
            }
            events.push(OperationEvent {
                tick,
                kind: OperationEventKind::Rejected {
                    operation: op.kind.clone(),
                    group: op.group,
                    source: op.source,
                },
            });
            return;
        };

        debug!(tick, op = op.kind.name(), group = %op.group, source = ?op.source, "executed");
        if op.source == Source::Manual {
            self.redo_stack.clear();
        }
        self.history_mut(inverse.source).push(inverse);
        events.push(OperationEvent {
            tick,
            kind: OperationEventKind::Executed {
                operation: op.kind.clone(),
                group: op.group,
                source: op.source,
            },
        });
    }

    /// A journaled undo/redo step is being replayed: take its entry off the
    /// stack it was popped from when it was recorded.
    fn retire_journaled(&mut self, op: &Operation) {
        let strict = matches!(self.mode, HandlerMode::Replaying(w) if w.from == 0);
        let stack = self.history_mut(op.source);
        let matches_top = stack
            .last()
            .map(|top| top.kind == op.kind && top.group == op.group);
        match matches_top {
            Some(true) => {
                stack.pop();
            }
            Some(false) if strict => panic!(
                "history out of step with log: replaying {} ({}) but stack holds {:?}",
                op.kind.name(),
                op.group,
                stack.last().map(|top| (top.kind.name(), top.group))
            ),
            // History from before the replay window is not known.
            _ => {}
        }
    }

    fn open_checksum_slot(&mut self, tick: u64) -> ChecksumSlot {
        let policy = match self.mode {
            HandlerMode::Recording => {
                if !self.record_checksums {
                    return ChecksumSlot::Untracked;
                }
                if self.checksums.end_tick() != tick {
                    debug!(
                        tick,
                        table_end = self.checksums.end_tick(),
                        "checksum recording restarts"
                    );
                    self.checksums.purge(tick);
                }
                self.checksums.open_slot(tick);
                return ChecksumSlot::Record;
            }
            HandlerMode::Replaying(window) => window.policy,
        };

        match self.checksums.get(tick) {
            Some(recorded) => match policy {
                ChecksumPolicy::Verify => ChecksumSlot::Verify(recorded),
                ChecksumPolicy::Repair => ChecksumSlot::Repair(recorded),
                ChecksumPolicy::Off => ChecksumSlot::Untracked,
            },
            None if tick < self.checksums.first_tick() || !self.record_checksums => {
                ChecksumSlot::Untracked
            }
            None => {
                assert_eq!(
                    tick,
                    self.checksums.end_tick(),
                    "checksum table has a gap before tick {tick}"
                );
                self.checksums.open_slot(tick);
                ChecksumSlot::Record
            }
        }
    }

    fn close_checksum_slot(
        &mut self,
        tick: u64,
        slot: ChecksumSlot,
        computed: u32,
        events: &mut Vec<OperationEvent>,
    ) {
        match slot {
            ChecksumSlot::Untracked => {}
            ChecksumSlot::Record => {
                debug!(tick, checksum = computed, "tick checksum");
                self.checksums.set(tick, computed);
            }
            ChecksumSlot::Verify(recorded) => {
                if recorded != computed {
                    error!(tick, recorded, computed, "checksum mismatch during replay");
                    panic!(
                        "desync at tick {tick}: recorded checksum {recorded:#010x}, replay computed {computed:#010x}"
                    );
                }
            }
            ChecksumSlot::Repair(recorded) => {
                if recorded != computed {
                    warn!(tick, recorded, computed, "checksum repaired");
                    self.checksums.set(tick, computed);
                    events.push(OperationEvent {
                        tick,
                        kind: OperationEventKind::ChecksumRepaired { recorded, computed },
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Replay control
    // -----------------------------------------------------------------------

    /// Replay the log from entry `from`. `world` and `ctx` must already be in
    /// the state they had when that entry was about to run. Undo/redo
    /// history is cleared and rebuilt by the replay itself. Recording resumes
    /// once the clock reaches the tick recording had reached.
    pub fn start_replay(&mut self, from: usize, policy: ChecksumPolicy, ctx: &SimContext) {
        assert!(!self.inside_frame, "start_replay from inside a tick");
        assert!(
            from <= self.log.len(),
            "replay start {from} past end of log ({})",
            self.log.len()
        );
        let end_tick = match self.mode {
            HandlerMode::Recording => self.clock,
            HandlerMode::Replaying(window) => window.end_tick,
        };
        self.cursor = from;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.clock = ctx.tick;

        if ctx.tick >= end_tick {
            self.mode = HandlerMode::Recording;
            info!(tick = ctx.tick, from, "nothing to replay");
            return;
        }
        self.mode = HandlerMode::Replaying(ReplayWindow {
            policy,
            from,
            end_tick,
        });
        info!(tick = ctx.tick, from, end_tick, ?policy, "replay started");
    }

    /// Stop replaying and make the replayed state the present: the log is
    /// cut at the cursor and the checksum table at the current tick.
    /// Returns the number of log entries discarded.
    pub fn cancel_replay(&mut self, ctx: &SimContext) -> usize {
        assert!(!self.inside_frame, "cancel_replay from inside a tick");
        assert!(self.is_replaying(), "cancel_replay while recording");
        let discarded = self.log.len() - self.cursor;
        self.log.truncate(self.cursor);
        self.checksums.truncate(ctx.tick);
        self.clock = ctx.tick;
        self.mode = HandlerMode::Recording;
        info!(tick = ctx.tick, discarded, "replay cancelled");
        discarded
    }

    /// Forget recorded checksums (compact save). Recording continues from
    /// the current tick.
    pub fn purge_checksums(&mut self, ctx: &SimContext) {
        assert!(!self.is_replaying(), "purge_checksums during replay");
        info!(tick = ctx.tick, dropped = self.checksums.len(), "checksums purged");
        self.checksums.purge(ctx.tick);
    }
}
