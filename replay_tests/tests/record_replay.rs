// End-to-end record/replay tests.
//
// Each test records a session through `TestColony` (same handler, world and
// context code the game uses), saves it as journal JSON, loads the JSON into
// a fresh colony built on the same starting world, replays it, and checks
// that the replayed colony is indistinguishable from the recorded one:
// world, checksum table, history stacks, clock and random state.

use homestead_sim::checksum::ChecksumPolicy;
use homestead_sim::config::GameConfig;
use homestead_sim::context::SimContext;
use homestead_sim::event::OperationEventKind;
use homestead_sim::handler::OperationHandler;
use homestead_sim::journal::ReplayJournal;
use homestead_sim::types::{Area, ItemKind, TileCoord};
use homestead_sim::world::ColonyWorld;
use replay_tests::{
    FLAG_B, FLAG_G, FLAG_H, GUARD_HOUSE, SAWMILL, STOCK, TestColony, WOODCUTTER,
};

/// Build the village and play 300 ticks touching every operation kind:
/// setting changes, a road split, a flag move with a road reshape, a
/// cascading removal, and undo/redo of the last two.
fn play_session(colony: &mut TestColony) {
    colony.build_village();

    colony.run_until(40);
    {
        let (ctx, ops) = (&colony.ctx, &mut colony.ops);
        ops.schedule_route_priority(ctx, TileCoord::new(4, 6), 2);
        ops.schedule_stock_adjustment(ctx, STOCK, ItemKind::Log, 2, 8);
        ops.schedule_input_buffer(ctx, SAWMILL, true);
        ops.schedule_change_area(
            ctx,
            GUARD_HOUSE,
            Some(Area {
                center: FLAG_G,
                radius: 4,
            }),
        );
        ops.schedule_worker_count(ctx, WOODCUTTER, 2);
    }

    colony.run_until(80);
    colony
        .ops
        .schedule_create_flag(&colony.world, &colony.ctx, TileCoord::new(7, 4));

    colony.run_until(120);
    colony
        .ops
        .schedule_move_flag(&colony.ctx, FLAG_H, TileCoord::new(21, 20));
    colony.ops.schedule_move_road_segment(
        &colony.ctx,
        TileCoord::new(20, 20),
        TileCoord::new(21, 21),
    );

    colony.run_until(160);
    colony
        .ops
        .schedule_remove_flag(&colony.world, &colony.ctx, FLAG_B);

    colony.run_until(200);
    colony.undo();
    colony.run_until(210);
    colony.undo();
    colony.run_until(215);
    colony.redo();
    colony.run_until(300);
}

fn assert_same_colony(a: &TestColony, b: &TestColony) {
    assert_eq!(a.ctx.tick, b.ctx.tick);
    assert_eq!(a.ctx.frame_seed(), b.ctx.frame_seed());
    assert_eq!(a.world, b.world);
    assert_eq!(a.ops.checksums(), b.ops.checksums());
    assert_eq!(a.ops.undo_stack(), b.ops.undo_stack());
    assert_eq!(a.ops.redo_stack(), b.ops.redo_stack());
    assert_eq!(a.ops.log(), b.ops.log());
    assert_eq!(a.ops.cursor(), b.ops.cursor());
}

#[test]
fn session_plays_as_scripted() {
    let mut colony = TestColony::new(7);
    play_session(&mut colony);

    assert!(
        colony
            .events()
            .all(|e| !matches!(e.kind, OperationEventKind::Rejected { .. }))
    );
    // Cascade undone: the stock and its flag are back.
    assert!(colony.world.flag(FLAG_B).is_some());
    assert!(colony.world.structure(STOCK).is_some());
    // Flag move kept, road segment move redone.
    assert!(colony.world.flag(TileCoord::new(21, 20)).is_some());
    assert!(colony.world.road(TileCoord::new(21, 21)).is_some());
    // The cascade's four inverses are still redoable.
    assert_eq!(colony.ops.redo_stack().len(), 4);
    assert_eq!(colony.ops.checksums().len(), 300);
}

#[test]
fn replay_reproduces_session() {
    let mut colony = TestColony::new(7);
    play_session(&mut colony);

    let replayed = colony.reload(ChecksumPolicy::Verify);
    assert!(!replayed.ops.is_replaying());
    assert_same_colony(&colony, &replayed);
    assert_eq!(replayed.ops.group_counter(), colony.ops.group_counter());
    assert_eq!(
        replayed
            .events()
            .filter(|e| e.kind == OperationEventKind::ReplayFinished)
            .count(),
        1
    );
}

#[test]
fn replayed_session_saves_identically() {
    let mut colony = TestColony::new(8);
    play_session(&mut colony);
    let replayed = colony.reload(ChecksumPolicy::Verify);
    assert_eq!(replayed.save(), colony.save());
}

#[test]
fn recording_continues_after_replay() {
    let mut colony = TestColony::new(9);
    play_session(&mut colony);
    let mut replayed = colony.reload(ChecksumPolicy::Verify);

    for c in [&mut colony, &mut replayed] {
        c.ops.schedule_worker_count(&c.ctx, WOODCUTTER, 1);
        c.run(50);
        c.undo();
        c.run(50);
    }
    assert_same_colony(&colony, &replayed);
    assert_eq!(colony.ops.checksums().len(), 400);
}

#[test]
#[should_panic(expected = "desync")]
fn tampered_checksum_is_a_desync() {
    let mut colony = TestColony::new(10);
    play_session(&mut colony);

    let mut journal = ReplayJournal::from_json(&colony.save()).unwrap();
    let recorded = journal.checksums.get(150).unwrap();
    journal.checksums.set(150, !recorded);
    let mut replayed = TestColony::load(
        colony.initial.clone(),
        &journal.to_json().unwrap(),
        ChecksumPolicy::Verify,
    );
    replayed.finish_replay();
}

/// A rebalanced config replays a different simulation: verification fails,
/// repair re-baselines the table, and the repaired journal then verifies.
#[test]
fn changed_logic_is_repaired() {
    let mut colony = TestColony::new(11);
    play_session(&mut colony);

    let mut rebalanced = colony.initial.clone();
    rebalanced.config.haul_chance = (1, 2);

    let mut repaired = TestColony::load(rebalanced, &colony.save(), ChecksumPolicy::Repair);
    repaired.finish_replay();
    assert!(
        repaired
            .events()
            .any(|e| matches!(e.kind, OperationEventKind::ChecksumRepaired { .. }))
    );
    assert_ne!(repaired.ops.checksums(), colony.ops.checksums());
    assert_eq!(repaired.ops.checksums().len(), colony.ops.checksums().len());

    let verified = repaired.reload(ChecksumPolicy::Verify);
    assert_same_colony(&repaired, &verified);
}

#[test]
#[should_panic(expected = "desync")]
fn changed_logic_fails_verification() {
    let mut colony = TestColony::new(11);
    play_session(&mut colony);

    let mut rebalanced = colony.initial.clone();
    rebalanced.config.haul_chance = (1, 2);
    let mut replayed = TestColony::load(rebalanced, &colony.save(), ChecksumPolicy::Verify);
    replayed.finish_replay();
}

#[test]
fn compacted_journal_replays_unverified() {
    let mut colony = TestColony::new(12);
    play_session(&mut colony);

    let mut journal = colony.ops.journal();
    journal.compact();
    let mut replayed = TestColony::load(
        colony.initial.clone(),
        &journal.to_json().unwrap(),
        ChecksumPolicy::Verify,
    );
    replayed.finish_replay();
    assert_eq!(replayed.world, colony.world);
    assert!(replayed.ops.checksums().is_empty());
    assert_eq!(replayed.ops.checksums().first_tick(), 300);

    replayed.run(10);
    assert_eq!(replayed.ops.checksums().len(), 10);
}

#[test]
fn purge_then_save_keeps_recent_checksums_only() {
    let mut colony = TestColony::new(13);
    colony.build_village();
    colony.run(100);
    colony.ops.purge_checksums(&colony.ctx);
    colony.run(50);

    let journal = colony.ops.journal();
    assert_eq!(journal.checksums.first_tick(), 100);
    assert_eq!(journal.checksums.len(), 50);

    // Ticks before the purge replay unverified, later ones verify.
    let replayed = colony.reload(ChecksumPolicy::Verify);
    assert_same_colony(&colony, &replayed);
}

#[test]
fn scheduling_mid_replay_starts_a_new_branch() {
    let mut colony = TestColony::new(14);
    play_session(&mut colony);

    let mut branch = TestColony::load(colony.initial.clone(), &colony.save(), ChecksumPolicy::Verify);
    branch.run_until(100);
    assert!(branch.ops.is_replaying());

    branch.ops.schedule_worker_count(&branch.ctx, WOODCUTTER, 0);
    assert!(!branch.ops.is_replaying());
    assert!(
        branch
            .ops
            .log()
            .entries()
            .iter()
            .all(|op| op.scheduled_tick <= 100)
    );
    assert_eq!(branch.ops.checksums().end_tick(), 100);

    branch.run(50);
    assert_eq!(branch.world.structure(WOODCUTTER).unwrap().state.workers, 0);
    // The removal at tick 160 belongs to the discarded future.
    assert_eq!(branch.world.roads().count(), 5);

    let replayed = branch.reload(ChecksumPolicy::Verify);
    assert_same_colony(&branch, &replayed);
}

#[test]
fn undo_mid_replay_uses_rebuilt_history() {
    let mut colony = TestColony::new(15);
    play_session(&mut colony);

    let mut branch = TestColony::load(colony.initial.clone(), &colony.save(), ChecksumPolicy::Verify);
    branch.run_until(170);
    assert!(branch.world.flag(FLAG_B).is_none());

    // Top of the rebuilt undo stack is the cascading removal at tick 160.
    let events = branch.undo();
    assert_eq!(events.len(), 4);
    assert!(!branch.ops.is_replaying());
    assert!(branch.world.flag(FLAG_B).is_some());
    assert!(branch.world.structure(STOCK).is_some());

    branch.run(30);
    let replayed = branch.reload(ChecksumPolicy::Verify);
    assert_same_colony(&branch, &replayed);
}

/// Toggle the woodcutter's crew every 20 ticks from inside the tick.
fn toggle_woodcutter(world: &mut ColonyWorld, ctx: &mut SimContext, ops: &mut OperationHandler) {
    if ctx.tick % 20 == 19 {
        let workers = world.structure(WOODCUTTER).map_or(1, |s| s.state.workers);
        ops.schedule_worker_count(ctx, WOODCUTTER, 3 - workers);
    }
}

#[test]
fn hook_scheduled_operations_replay_once() {
    let mut colony = TestColony::new(16);
    colony.build_village();
    colony.run_with(200, &mut toggle_woodcutter);
    // The hook's last operation (scheduled at tick 199) is still pending.
    assert!(colony.ops.cursor() < colony.ops.log().len());
    assert_eq!(colony.ops.log().last().unwrap().scheduled_tick, 200);

    let mut replayed = colony.reload(ChecksumPolicy::Verify);
    assert_same_colony(&colony, &replayed);

    colony.run_with(100, &mut toggle_woodcutter);
    replayed.run_with(100, &mut toggle_woodcutter);
    assert_same_colony(&colony, &replayed);
}

#[test]
fn rejected_operations_replay_as_rejected() {
    let mut colony = TestColony::new(17);
    colony.build_village();
    colony.run(5);
    colony.ops.schedule_remove_structure(&colony.ctx, TileCoord::new(40, 40));
    colony.ops.schedule_worker_count(&colony.ctx, WOODCUTTER, 9);
    colony.run(5);

    let rejected = |c: &TestColony| {
        c.events()
            .filter(|e| matches!(e.kind, OperationEventKind::Rejected { .. }))
            .count()
    };
    assert_eq!(rejected(&colony), 2);
    let replayed = colony.reload(ChecksumPolicy::Verify);
    assert_eq!(rejected(&replayed), 2);
    assert_same_colony(&colony, &replayed);
}

#[test]
fn different_seeds_diverge() {
    let mut a = TestColony::with_config(GameConfig::default(), 1);
    let mut b = TestColony::with_config(GameConfig::default(), 2);
    for c in [&mut a, &mut b] {
        c.build_village();
        c.run(200);
    }
    assert_ne!(a.ops.checksums(), b.ops.checksums());
}
