use camino::Utf8PathBuf;
use std::fmt;

/// Where a candidate currently sits in the pack pipeline.
///
/// `Skipped`, `Failed` and `SourceDeleted` are terminal. Only `SourceDeleted`
/// involves removing the original directory, and it is only reachable from
/// `Verified`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackStage {
    Pending,
    Staging,
    Staged { files: usize },
    Archiving,
    Archived,
    Verifying,
    Verified,
    SourceDeleted,
    Skipped,
    Failed { reason: String },
}

impl PackStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SourceDeleted | Self::Skipped | Self::Failed { .. })
    }
}

impl fmt::Display for PackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Staging => f.write_str("staging"),
            Self::Staged { files } => write!(f, "staged ({} files)", files),
            Self::Archiving => f.write_str("archiving"),
            Self::Archived => f.write_str("archived"),
            Self::Verifying => f.write_str("verifying"),
            Self::Verified => f.write_str("verified"),
            Self::SourceDeleted => f.write_str("source deleted"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Final status of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStatus {
    /// Archive verified and source removed
    Archived,
    /// Left untouched (ignore marker, nothing to stage)
    Skipped,
    Failed,
    /// Dry run: would have been archived
    Planned,
}

impl fmt::Display for PackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Archived => "archived",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Planned => "planned",
        };
        f.write_str(name)
    }
}

/// Which long-running operation a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Discovery,
    Enumeration,
    Copy,
    Batch,
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovery => "discovery",
            Self::Enumeration => "enumeration",
            Self::Copy => "copy",
            Self::Batch => "batch",
        };
        f.write_str(name)
    }
}

/// Snapshot of a pack run.
///
/// Wrapped by [`crate::state::StateManager`]; mutate it only through the
/// manager so change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    pub root: Option<Utf8PathBuf>,
    pub is_running: bool,
    pub dry_run: bool,

    pub current_candidate: Option<String>,
    pub current_stage: Option<PackStage>,

    pub progress_phase: Option<ProgressPhase>,
    pub progress: usize,
    pub progress_total: usize,

    pub candidates: Vec<String>,

    pub archived: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub planned: Vec<String>,
}

impl RunState {
    /// Number of candidates that reached a terminal status
    pub fn processed(&self) -> usize {
        self.archived.len() + self.skipped.len() + self.failed.len() + self.planned.len()
    }

    /// Returns (archived, skipped, failed, planned)
    pub fn totals(&self) -> (usize, usize, usize, usize) {
        (
            self.archived.len(),
            self.skipped.len(),
            self.failed.len(),
            self.planned.len(),
        )
    }

    pub fn add_result(&mut self, candidate: String, status: PackStatus) {
        match status {
            PackStatus::Archived => self.archived.push(candidate),
            PackStatus::Skipped => self.skipped.push(candidate),
            PackStatus::Failed => self.failed.push(candidate),
            PackStatus::Planned => self.planned.push(candidate),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(PackStage::SourceDeleted.is_terminal());
        assert!(PackStage::Skipped.is_terminal());
        assert!(PackStage::Failed { reason: "x".into() }.is_terminal());
        assert!(!PackStage::Verified.is_terminal());
        assert!(!PackStage::Staged { files: 0 }.is_terminal());
    }

    #[test]
    fn test_add_result_and_totals() {
        let mut state = RunState::default();
        state.add_result("A".into(), PackStatus::Archived);
        state.add_result("B".into(), PackStatus::Skipped);
        state.add_result("C".into(), PackStatus::Failed);
        state.add_result("D".into(), PackStatus::Archived);

        assert_eq!(state.totals(), (2, 1, 1, 0));
        assert_eq!(state.processed(), 4);
    }

    #[test]
    fn test_reset() {
        let mut state = RunState {
            is_running: true,
            progress: 4,
            ..Default::default()
        };
        state.add_result("A".into(), PackStatus::Planned);
        state.reset();

        assert!(!state.is_running);
        assert_eq!(state.processed(), 0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PackStage::Staged { files: 3 }.to_string(), "staged (3 files)");
        assert_eq!(
            PackStage::Failed { reason: "boom".into() }.to_string(),
            "failed: boom"
        );
    }
}
