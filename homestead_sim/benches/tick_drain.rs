// Benchmarks for the per-tick path: world update plus log drain, and a full
// replay of a recorded session under checksum verification.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use homestead_sim::checksum::ChecksumPolicy;
use homestead_sim::config::GameConfig;
use homestead_sim::context::SimContext;
use homestead_sim::handler::OperationHandler;
use homestead_sim::journal::ReplayJournal;
use homestead_sim::types::{StructureKind, TileCoord};
use homestead_sim::world::ColonyWorld;

/// A row of `chains` flag pairs, each joined by a road and served by a
/// woodcutter. Returns the starting world and the journal of `ticks` ticks
/// with a worker change every 50.
fn record(chains: i32, ticks: u64) -> (ColonyWorld, ReplayJournal) {
    let initial = ColonyWorld::new(GameConfig::default());
    let mut world = initial.clone();
    let mut ctx = SimContext::new(0xBEEF);
    let mut ops = OperationHandler::new(&world.config, &ctx);
    for i in 0..chains {
        let y = 2 + 3 * i;
        ops.schedule_create_flag(&world, &ctx, TileCoord::new(2, y));
        ops.schedule_create_flag(&world, &ctx, TileCoord::new(8, y));
        ops.schedule_create_road(&world, &ctx, (2..=8).map(|x| TileCoord::new(x, y)).collect());
        ops.schedule_create_structure(&ctx, StructureKind::Woodcutter, TileCoord::new(1, y));
    }
    for tick in 0..ticks {
        if tick % 50 == 25 {
            let y = 2 + 3 * (tick as i32 / 50 % chains);
            ops.schedule_worker_count(&ctx, TileCoord::new(1, y), 2);
        }
        ops.advance(&mut world, &mut ctx);
    }
    (initial, ops.journal())
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance");
    for chains in [1, 8, 20] {
        group.bench_with_input(BenchmarkId::from_parameter(chains), &chains, |b, &chains| {
            let (initial, journal) = record(chains, 200);
            let mut world = initial.clone();
            let mut ctx = SimContext::new(journal.initial_seed);
            let mut ops = OperationHandler::from_journal(journal, &world.config);
            // Fast-forward the world to where the journal ends.
            ops.start_replay(0, ChecksumPolicy::Off, &ctx);
            while ops.is_replaying() {
                ops.advance(&mut world, &mut ctx);
            }
            b.iter(|| ops.advance(&mut world, &mut ctx));
        });
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let (initial, journal) = record(8, 1_000);
    c.bench_function("replay_1000_ticks_verify", |b| {
        b.iter(|| {
            let mut world = initial.clone();
            let (mut ops, mut ctx) = OperationHandler::load_and_replay(
                journal.clone(),
                &world.config,
                ChecksumPolicy::Verify,
            );
            while ops.is_replaying() {
                ops.advance(&mut world, &mut ctx);
            }
            world
        });
    });
}

fn bench_journal_json(c: &mut Criterion) {
    let (_, journal) = record(8, 1_000);
    let json = journal.to_json().unwrap_or_default();
    c.bench_function("journal_to_json", |b| b.iter(|| journal.to_json()));
    c.bench_function("journal_from_json", |b| b.iter(|| ReplayJournal::from_json(&json)));
}

criterion_group!(benches, bench_advance, bench_replay, bench_journal_json);
criterion_main!(benches);
