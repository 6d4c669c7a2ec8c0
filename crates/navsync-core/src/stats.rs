#![forbid(unsafe_code)]

//! Engine counters.

use std::cell::Cell;

/// Snapshot of what an engine has done since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Pushes issued to the backend (location writes and `merge`).
    pub pushes: u64,
    /// Replaces issued to the backend.
    pub replaces: u64,
    /// Backend notifications received.
    pub backend_events: u64,
    /// Engine reactions run (location changes, parameter changes, query
    /// rebuild checks).
    pub reactions: u64,
    /// Reactions that found nothing to propagate.
    pub suppressed: u64,
    /// Times the parameter view was rebuilt from a new query.
    pub params_rebuilds: u64,
}

impl SyncStats {
    /// Backend operations issued by the engine.
    #[must_use]
    pub fn backend_writes(&self) -> u64 {
        self.pushes + self.replaces
    }
}

/// Interior-mutable counter cell.
#[derive(Debug, Default)]
pub(crate) struct StatsCell(Cell<SyncStats>);

impl StatsCell {
    pub(crate) fn get(&self) -> SyncStats {
        self.0.get()
    }

    pub(crate) fn bump(&self, f: impl FnOnce(&mut SyncStats)) {
        let mut stats = self.0.get();
        f(&mut stats);
        self.0.set(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_accumulates() {
        let cell = StatsCell::default();
        cell.bump(|s| s.pushes += 1);
        cell.bump(|s| s.replaces += 2);
        let stats = cell.get();
        assert_eq!(stats.backend_writes(), 3);
        assert_eq!(stats.reactions, 0);
    }
}
