//! Lifecycle phase of every runner, readable while the pool runs.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunnerPhase {
    Initializing = 0,
    Connecting = 1,
    Creating = 2,
    Looping = 3,
    Deleting = 4,
    Done = 5,
}

impl RunnerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initializing,
            1 => Self::Connecting,
            2 => Self::Creating,
            3 => Self::Looping,
            4 => Self::Deleting,
            _ => Self::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Connecting => "connecting",
            Self::Creating => "creating",
            Self::Looping => "looping",
            Self::Deleting => "deleting",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RunnerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseEntry {
    pub worker: usize,
    pub phase: RunnerPhase,
}

/// One slot per worker. Each slot is written only by its own runner.
#[derive(Debug, Clone)]
pub struct PhaseBoard {
    slots: Arc<[AtomicU8]>,
}

impl PhaseBoard {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers)
                .map(|_| AtomicU8::new(RunnerPhase::Initializing as u8))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Out-of-range workers are ignored.
    pub fn set(&self, worker: usize, phase: RunnerPhase) {
        if let Some(slot) = self.slots.get(worker) {
            slot.store(phase as u8, Ordering::Release);
        }
    }

    pub fn get(&self, worker: usize) -> Option<RunnerPhase> {
        self.slots
            .get(worker)
            .map(|slot| RunnerPhase::from_u8(slot.load(Ordering::Acquire)))
    }

    pub fn snapshot(&self) -> Vec<RunnerPhase> {
        self.slots
            .iter()
            .map(|slot| RunnerPhase::from_u8(slot.load(Ordering::Acquire)))
            .collect()
    }

    pub fn entries(&self) -> Vec<PhaseEntry> {
        self.snapshot()
            .into_iter()
            .enumerate()
            .map(|(worker, phase)| PhaseEntry { worker, phase })
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.snapshot()
            .iter()
            .all(|phase| *phase == RunnerPhase::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_tracks_each_worker() {
        let board = PhaseBoard::new(3);
        assert_eq!(board.len(), 3);
        assert_eq!(board.get(0), Some(RunnerPhase::Initializing));

        board.set(1, RunnerPhase::Looping);
        board.set(7, RunnerPhase::Done);
        assert_eq!(
            board.snapshot(),
            vec![
                RunnerPhase::Initializing,
                RunnerPhase::Looping,
                RunnerPhase::Initializing
            ]
        );
        assert_eq!(board.get(7), None);
        assert!(!board.all_done());

        for worker in 0..3 {
            board.set(worker, RunnerPhase::Done);
        }
        assert!(board.all_done());
    }

    #[test]
    fn test_entries_serialize() {
        let board = PhaseBoard::new(2);
        board.set(1, RunnerPhase::Deleting);
        let json = serde_json::to_string(&board.entries()).unwrap();
        assert_eq!(
            json,
            r#"[{"worker":0,"phase":"initializing"},{"worker":1,"phase":"deleting"}]"#
        );
    }
}
