//! Data models for projzip.
//!
//! - [`PackSettings`]: settings loaded from `projzip.yaml` and the environment
//! - [`ExclusionConfig`]: immutable marker / pruned-directory / extension sets built once per run
//! - [`ProjectCandidate`], [`StagedFileSet`], [`ArchiveJob`], [`PackLayout`]: per-candidate
//!   pipeline data
//! - [`RunState`]: run progress and results, owned by [`StateManager`](crate::state::StateManager)

pub mod config;
pub mod exclusion;
pub mod project;
pub mod run_state;

pub use config::{ArchiverPreference, OverwriteMode, PackSettings};
pub use exclusion::{ExclusionConfig, normalize_extension};
pub use project::{ArchiveJob, PackLayout, ProjectCandidate, StagedFileSet};
pub use run_state::{PackStage, PackStatus, ProgressPhase, RunState};
