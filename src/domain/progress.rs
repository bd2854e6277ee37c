//! Progress snapshots pushed to the UI after every unit of work.
//!
//! Snapshots are recreated for every notification; the pipeline keeps no
//! history, the receiver owns the last one it saw.

use serde::{Deserialize, Serialize};

/// Stage of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Enumerating inputs (vault walk).
    Discovering,
    /// Running a parser over an input.
    Parsing,
    /// Persisting a note or writing an artifact.
    Writing,
    /// Batch complete.
    Finishing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovering => write!(f, "discovering"),
            Self::Parsing => write!(f, "parsing"),
            Self::Writing => write!(f, "writing"),
            Self::Finishing => write!(f, "finishing"),
        }
    }
}

/// Integer percentage of `current` over `total`, 100 for an empty batch.
const fn percentage(current: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (current as u64 * 100) / total as u64;
    if pct > 100 {
        100
    } else {
        pct as u8
    }
}

/// Import progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub phase: Phase,
    /// Input or note currently being handled.
    pub current_file: String,
    /// 1-based index of the current input.
    pub current: u32,
    /// Number of inputs in the batch.
    pub total: u32,
}

impl ImportProgress {
    #[must_use]
    pub fn new(phase: Phase, current_file: impl Into<String>, current: u32, total: u32) -> Self {
        Self {
            phase,
            current_file: current_file.into(),
            current,
            total,
        }
    }

    /// Completion in the range 0..=100.
    #[must_use]
    pub const fn percentage(&self) -> u8 {
        percentage(self.current, self.total)
    }
}

/// Export progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: Phase,
    /// What is happening right now, e.g. `Exporting Groceries` or a
    /// serializer sub-step such as `rendering`.
    pub current_operation: String,
    /// 1-based index of the current note.
    pub current: u32,
    /// Number of notes in the batch.
    pub total: u32,
}

impl ExportProgress {
    #[must_use]
    pub fn new(phase: Phase, current_operation: impl Into<String>, current: u32, total: u32) -> Self {
        Self {
            phase,
            current_operation: current_operation.into(),
            current,
            total,
        }
    }

    /// Completion in the range 0..=100.
    #[must_use]
    pub const fn percentage(&self) -> u8 {
        percentage(self.current, self.total)
    }
}
