// State management module
//
// This module provides the StateManager which wraps RunState with thread-safe access
// using Arc<RwLock<T>> and emits change events for listeners.

use crate::models::{PackStage, PackStatus, ProgressPhase, RunState};
use crate::services::progress::{ProgressObserver, ProgressUpdate};
use camino::Utf8PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when run state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A run has started with this many candidates
    RunStarted { total_candidates: usize, dry_run: bool },

    /// A candidate moved to a new pipeline stage
    StageChanged { candidate: String, stage: PackStage },

    /// Progress inside a long-running operation
    ProgressUpdated {
        phase: ProgressPhase,
        current: usize,
        total: usize,
        label: String,
    },

    /// A candidate reached a terminal status
    CandidateProcessed {
        candidate: String,
        status: PackStatus,
        message: String,
    },

    /// The run has finished
    RunFinished {
        archived: usize,
        skipped: usize,
        failed: usize,
        planned: usize,
    },

    StateReset,
}

/// Thread-safe run state with event emission.
///
/// - [`read()`](Self::read) for reading state under a short-lived lock
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// Sending never fails the caller: events with no listener are dropped. A
/// poisoned lock is recovered rather than propagated.
pub struct StateManager {
    state: Arc<RwLock<RunState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> RunState {
        self.read_lock().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// ```ignore
    /// let failed = state_manager.read(|state| state.failed.len());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        f(&self.read_lock())
    }

    /// Apply `update_fn`, diff against the previous state and emit the resulting events
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let changes = {
            let mut state = self.write_lock();
            let old_state = state.clone();
            update_fn(&mut state);
            Self::detect_changes(&old_state, &state)
        };

        for change in &changes {
            self.emit(change.clone());
        }
        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange) {
        // No receivers is fine
        let _ = self.state_tx.send(change);
    }

    fn detect_changes(old: &RunState, new: &RunState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_running != new.is_running {
            if new.is_running {
                changes.push(StateChange::RunStarted {
                    total_candidates: new.candidates.len(),
                    dry_run: new.dry_run,
                });
            } else {
                let (archived, skipped, failed, planned) = new.totals();
                changes.push(StateChange::RunFinished {
                    archived,
                    skipped,
                    failed,
                    planned,
                });
            }
        }

        if old.current_stage != new.current_stage
            || old.current_candidate != new.current_candidate
        {
            if let (Some(candidate), Some(stage)) = (&new.current_candidate, &new.current_stage) {
                changes.push(StateChange::StageChanged {
                    candidate: candidate.clone(),
                    stage: stage.clone(),
                });
            }
        }

        if old.progress != new.progress
            || old.progress_total != new.progress_total
            || old.progress_phase != new.progress_phase
        {
            if let Some(phase) = new.progress_phase {
                changes.push(StateChange::ProgressUpdated {
                    phase,
                    current: new.progress,
                    total: new.progress_total,
                    label: new.current_candidate.clone().unwrap_or_default(),
                });
            }
        }

        changes
    }

    // Convenience methods for common state updates

    /// Begin a run over `candidates`
    pub fn start_run(
        &self,
        root: Utf8PathBuf,
        candidates: Vec<String>,
        dry_run: bool,
    ) -> Vec<StateChange> {
        self.update(|state| {
            state.reset();
            state.root = Some(root);
            state.dry_run = dry_run;
            state.candidates = candidates;
            state.is_running = true;
        })
    }

    pub fn finish_run(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_running = false;
            state.current_candidate = None;
            state.current_stage = None;
            state.progress_phase = None;
        })
    }

    /// Move `candidate` to `stage`
    pub fn set_stage(&self, candidate: &str, stage: PackStage) -> Vec<StateChange> {
        self.update(|state| {
            state.current_candidate = Some(candidate.to_string());
            state.current_stage = Some(stage);
        })
    }

    /// Record the terminal status of a candidate
    pub fn add_result(
        &self,
        candidate: String,
        status: PackStatus,
        message: String,
    ) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.add_result(candidate.clone(), status);
            state.progress_phase = Some(ProgressPhase::Batch);
            state.progress = state.processed();
            state.progress_total = state.candidates.len();
        });

        let processed = StateChange::CandidateProcessed {
            candidate,
            status,
            message,
        };
        self.emit(processed.clone());
        changes.push(processed);

        changes
    }

    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(RunState::reset);

        self.emit(StateChange::StateReset);
        changes.push(StateChange::StateReset);

        changes
    }
}

impl ProgressObserver for StateManager {
    fn notify(&self, update: &ProgressUpdate) {
        let changes = self.update(|state| {
            state.progress_phase = Some(update.phase);
            state.progress = update.current;
            state.progress_total = update.total;
        });
        tracing::trace!(
            "Progress {} {}/{} {} ({} events)",
            update.phase,
            update.current,
            update.total,
            update.label,
            changes.len()
        );
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same state and channel
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
