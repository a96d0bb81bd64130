// Replay journal: the persisted form of a recording session.
//
// A journal is everything `OperationHandler` needs to reproduce a session
// from its starting world: the tick and frame seed recording began at, the
// tick it had reached, the full operation log (manual operations plus
// journaled undo/redo steps), the group counter, and the per-tick checksum
// table. The world snapshot itself is the caller's business; a journal
// starts from whatever world the caller pairs it with.
//
// Serialized as JSON. `FORMAT_VERSION` is bumped whenever the layout of any
// persisted type changes; loading a journal with a different version fails
// instead of replaying garbage.
//
// See also: `handler.rs` (`journal()`, `from_journal()`,
// `load_and_replay()`), `checksum.rs` for the table layout.

use crate::checksum::ChecksumTable;
use crate::log::OperationLog;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("malformed journal: {0}")]
    Json(#[from] serde_json::Error),
    #[error("journal format version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
    #[error("journal ends at tick {end_tick}, before its start {start_tick}")]
    EndsBeforeStart { start_tick: u64, end_tick: u64 },
    #[error("operation log out of order at entry {index}")]
    Unordered { index: usize },
    #[error("log entry {index} scheduled for tick {tick}, before the journal start {start_tick}")]
    EntryBeforeStart {
        index: usize,
        tick: u64,
        start_tick: u64,
    },
    #[error("checksum table starts at tick {first_tick}, before the journal start {start_tick}")]
    ChecksumsBeforeStart { first_tick: u64, start_tick: u64 },
    #[error("checksum table runs to tick {table_end}, past the journal end {end_tick}")]
    ChecksumsPastEnd { table_end: u64, end_tick: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayJournal {
    pub format_version: u32,
    /// Tick recording started at.
    pub start_tick: u64,
    /// Frame seed at `start_tick`.
    pub initial_seed: u64,
    /// Tick recording had reached when the journal was taken.
    pub end_tick: u64,
    pub group_counter: u32,
    pub log: OperationLog,
    pub checksums: ChecksumTable,
}

impl ReplayJournal {
    pub fn to_json(&self) -> Result<String, JournalError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, JournalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a journal.
    pub fn from_json(json: &str) -> Result<Self, JournalError> {
        let journal: Self = serde_json::from_str(json)?;
        journal.validate()?;
        Ok(journal)
    }

    /// Reject journals a replay could not run: the log must be ordered and
    /// start no earlier than `start_tick`, and the checksum table must lie
    /// within `start_tick..end_tick`.
    fn validate(&self) -> Result<(), JournalError> {
        if self.format_version != FORMAT_VERSION {
            return Err(JournalError::Version {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if self.end_tick < self.start_tick {
            return Err(JournalError::EndsBeforeStart {
                start_tick: self.start_tick,
                end_tick: self.end_tick,
            });
        }
        if let Some(index) = self
            .log
            .entries()
            .windows(2)
            .position(|w| w[0].scheduled_tick > w[1].scheduled_tick)
        {
            return Err(JournalError::Unordered { index: index + 1 });
        }
        // Ordered, so only the first entry can be early.
        if let Some(first) = self.log.entries().first()
            && first.scheduled_tick < self.start_tick
        {
            return Err(JournalError::EntryBeforeStart {
                index: 0,
                tick: first.scheduled_tick,
                start_tick: self.start_tick,
            });
        }
        if !self.checksums.is_empty() && self.checksums.first_tick() < self.start_tick {
            return Err(JournalError::ChecksumsBeforeStart {
                first_tick: self.checksums.first_tick(),
                start_tick: self.start_tick,
            });
        }
        if self.checksums.end_tick() > self.end_tick {
            return Err(JournalError::ChecksumsPastEnd {
                table_end: self.checksums.end_tick(),
                end_tick: self.end_tick,
            });
        }
        Ok(())
    }

    /// Drop the checksum table, keeping only its position. A compacted
    /// journal replays without verification and records fresh checksums
    /// from `end_tick` on.
    pub fn compact(&mut self) {
        self.checksums.purge(self.end_tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::context::SimContext;
    use crate::handler::OperationHandler;
    use crate::types::TileCoord;
    use crate::world::ColonyWorld;

    fn recorded() -> ReplayJournal {
        let mut world = ColonyWorld::new(GameConfig::default());
        let mut ctx = SimContext::new(31);
        let mut ops = OperationHandler::new(&world.config, &ctx);
        ops.schedule_create_flag(&world, &ctx, TileCoord::new(2, 2));
        ops.schedule_create_flag(&world, &ctx, TileCoord::new(6, 2));
        ops.advance(&mut world, &mut ctx);
        ops.schedule_create_road(&world, &ctx, (2..=6).map(|x| TileCoord::new(x, 2)).collect());
        for _ in 0..4 {
            ops.advance(&mut world, &mut ctx);
        }
        ops.journal()
    }

    #[test]
    fn json_roundtrip() {
        let journal = recorded();
        assert_eq!(journal.end_tick, 5);
        assert_eq!(journal.checksums.len(), 5);
        let restored = ReplayJournal::from_json(&journal.to_json().unwrap()).unwrap();
        assert_eq!(journal, restored);
    }

    #[test]
    fn rejects_other_versions() {
        let mut journal = recorded();
        journal.format_version = FORMAT_VERSION + 1;
        let err = ReplayJournal::from_json(&journal.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, JournalError::Version { found, .. } if found == FORMAT_VERSION + 1));
    }

    #[test]
    fn rejects_unordered_log() {
        let journal = recorded();
        let mut value: serde_json::Value = serde_json::to_value(&journal).unwrap();
        let entries = value["log"].as_array_mut().unwrap();
        entries.swap(0, 2);
        let err = ReplayJournal::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, JournalError::Unordered { index: 1 }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = ReplayJournal::from_json("{\"format_version\": 1").unwrap_err();
        assert!(matches!(err, JournalError::Json(_)));
        assert!(err.to_string().starts_with("malformed journal"));
    }

    #[test]
    fn rejects_entries_before_start() {
        let mut journal = recorded();
        journal.compact();
        journal.start_tick = 1;
        let err = ReplayJournal::from_json(&journal.to_json().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            JournalError::EntryBeforeStart {
                index: 0,
                tick: 0,
                start_tick: 1
            }
        ));
    }

    #[test]
    fn rejects_end_before_start() {
        let mut journal = recorded();
        journal.compact();
        journal.start_tick = 6;
        let err = ReplayJournal::from_json(&journal.to_json().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            JournalError::EndsBeforeStart {
                start_tick: 6,
                end_tick: 5
            }
        ));
    }

    #[test]
    fn rejects_checksums_past_end() {
        let mut journal = recorded();
        journal.end_tick = 3;
        let err = ReplayJournal::from_json(&journal.to_json().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            JournalError::ChecksumsPastEnd {
                table_end: 5,
                end_tick: 3
            }
        ));
    }

    #[test]
    fn compact_keeps_position_only() {
        let mut journal = recorded();
        journal.compact();
        assert!(journal.checksums.is_empty());
        assert_eq!(journal.checksums.first_tick(), 5);
        assert_eq!(journal.log.len(), 3);
    }
}
