// homestead_sim: deterministic command and replay engine for a colony sim.
//
// Every player action (placing a flag, laying a road, changing a worker
// count) is an `Operation`: a self-describing, serializable value that can
// execute against the world and return its own exact inverse. Producers
// never mutate the world directly; they schedule operations into a tick-
// ordered log, and the `OperationHandler` drains that log once per tick
// after the world update. The log, the starting seed and a per-tick
// checksum table together are enough to re-run a session bit for bit and
// to detect the first tick where a replay diverges.
//
// Module overview:
// - `types.rs`:     TileCoord, Area, GroupId, structure and item kinds.
// - `config.rs`:    GameConfig: per-structure tuning, road defaults, limits.
// - `context.rs`:   SimContext: clock, frame-seeded random source, checksum.
// - `checksum.rs`:  ChecksumAccumulator (CRC-32), ChecksumTable, ChecksumPolicy.
// - `world.rs`:     ColonyWorld: flags, roads, structures, per-tick update.
// - `operation.rs`: Operation / OperationKind: execute-and-invert.
// - `log.rs`:       OperationLog: tick-ordered operation journal.
// - `event.rs`:     OperationEvent, TickReport: what the handler did.
// - `handler.rs`:   OperationHandler: scheduling, undo/redo, tick drain, replay.
// - `journal.rs`:   ReplayJournal: JSON persistence of a recording session.
// - `prng`:         Re-exported from `homestead_prng`: xoshiro256++ and the
//                   frame-seed chain.
//
// The crate has no notion of rendering, input or wall-clock time. The
// embedding game loop owns a `ColonyWorld`, a `SimContext` and an
// `OperationHandler` and calls `OperationHandler::advance` once per tick.
//
// **Critical constraint: determinism.** Given the same starting world, seed
// and log, every tick produces the same world and the same checksum. All
// randomness comes from the frame-seeded source in `SimContext`. No
// `HashMap`, no system time, no OS entropy. Use `BTreeMap` for ordered
// collections.

pub mod checksum;
pub mod config;
pub mod context;
pub mod event;
pub mod handler;
pub mod journal;
pub mod log;
pub mod operation;
pub use homestead_prng as prng;
pub mod types;
pub mod world;
