//! The pack run: discovery, then each candidate in turn through
//! staging, archiving, verification and source removal.
//!
//! Every candidate is isolated: whatever goes wrong while packing one is
//! turned into a [`PackResult`] with [`PackStatus::Failed`] and the run moves
//! on. Only an unusable root aborts the run.
//!
//! The source directory is removed only after [`verify_archive`] has accepted
//! the archive. The staging copy is removed on every path out of a candidate,
//! including early returns and failures.

use crate::metrics::Metrics;
use crate::models::{
    ArchiveJob, ExclusionConfig, OverwriteMode, PackLayout, PackStage, PackStatus, ProjectCandidate,
};
use crate::services::archive::{
    ArchiveReceipt, ArchiveTool, Archiver, prepare_destination, resolve_destination, verify_archive,
};
use crate::services::discovery::{discover_candidates, has_ignore_marker};
use crate::services::progress::ProgressObserver;
use crate::services::prompt::{ConfirmOverwrite, TerminalPrompt};
use crate::services::staging::{enumerate_files, stage_directory};
use crate::state::StateManager;
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of staged file names quoted in a failure message
const FAILURE_SAMPLE_SIZE: usize = 5;

/// Per-run switches coming from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowOptions {
    pub overwrite: OverwriteMode,

    /// Decide and report, but touch nothing on disk
    pub dry_run: bool,
}

/// Outcome of one candidate
#[derive(Debug, Clone)]
pub struct PackResult {
    pub candidate: String,
    pub status: PackStatus,
    pub message: String,
    pub duration: Duration,
    /// Files staged (or, in a dry run, that would be staged)
    pub files: usize,
    pub archive_bytes: u64,
}

/// Results of a whole run, in processing order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub results: Vec<PackResult>,
}

impl RunSummary {
    pub fn count(&self, status: PackStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(PackStatus::Failed) > 0
    }

    pub fn result(&self, candidate: &str) -> Option<&PackResult> {
        self.results.iter().find(|r| r.candidate == candidate)
    }
}

enum Outcome {
    Archived { files: usize, receipt: ArchiveReceipt },
    Skipped(String),
    Planned { files: usize, note: String },
}

/// A candidate error plus the staged files it concerned
struct CandidateFailure {
    error: anyhow::Error,
    staged_files: usize,
    staged_sample: Vec<String>,
}

impl CandidateFailure {
    fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            staged_files: 0,
            staged_sample: Vec::new(),
        }
    }

    fn with_sample(
        error: impl Into<anyhow::Error>,
        staged_files: usize,
        staged_sample: &[String],
    ) -> Self {
        Self {
            error: error.into(),
            staged_files,
            staged_sample: staged_sample.to_vec(),
        }
    }

    fn message(&self) -> String {
        if self.staged_sample.is_empty() {
            format!("{:#}", self.error)
        } else {
            format!(
                "{:#} (staged files include: {})",
                self.error,
                self.staged_sample.join(", ")
            )
        }
    }
}

/// Removes a candidate's staging directory when dropped
struct StagingDir {
    path: Utf8PathBuf,
}

impl StagingDir {
    /// Claim `path`, removing whatever an interrupted run left there
    fn claim(path: &Utf8Path) -> Result<Self> {
        if path.exists() {
            tracing::warn!("Removing leftover staging directory {}", path);
            fs::remove_dir_all(path)
                .with_context(|| format!("Failed to remove leftover staging directory: {}", path))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("Removed staging directory {}", self.path),
            Err(e) => tracing::warn!("Failed to remove staging directory {}: {}", self.path, e),
        }
    }
}

/// Drives a pack run over the candidates under one root
pub struct PackWorkflow<A: Archiver = ArchiveTool> {
    layout: PackLayout,
    exclusions: ExclusionConfig,
    options: WorkflowOptions,
    archiver: A,
    prompt: Box<dyn ConfirmOverwrite>,
    state: Arc<StateManager>,
    metrics: Arc<Metrics>,
}

impl<A: Archiver> PackWorkflow<A> {
    pub fn new(
        layout: PackLayout,
        exclusions: ExclusionConfig,
        archiver: A,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            layout,
            exclusions,
            options: WorkflowOptions::default(),
            archiver,
            prompt: Box::new(TerminalPrompt),
            state,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the interactive overwrite gate
    pub fn with_prompt(mut self, prompt: Box<dyn ConfirmOverwrite>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn layout(&self) -> &PackLayout {
        &self.layout
    }

    fn observer(&self) -> Option<&dyn ProgressObserver> {
        Some(self.state.as_ref())
    }

    /// Discover candidates under the root and process them one at a time.
    ///
    /// # Errors
    ///
    /// Only when the root cannot be scanned. Candidate failures are reported
    /// in the returned summary.
    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!(
            "Starting pack run in {} (overwrite: {:?}, dry run: {}, archiver: {})",
            self.layout.root,
            self.options.overwrite,
            self.options.dry_run,
            self.archiver.name()
        );

        let candidates = discover_candidates(&self.layout, &self.exclusions, self.observer())
            .with_context(|| format!("Discovery failed under {}", self.layout.root))?;

        if candidates.is_empty() {
            tracing::info!("No projects found under {}", self.layout.root);
        }

        self.state.start_run(
            self.layout.root.clone(),
            candidates.iter().map(|c| c.name.clone()).collect(),
            self.options.dry_run,
        );

        let summary = self.process_candidates(&candidates).await;

        if !self.options.dry_run {
            self.remove_empty_staging_root();
        }
        self.state.finish_run();

        tracing::info!(
            "Pack run completed: {} archived, {} skipped, {} failed, {} planned",
            summary.count(PackStatus::Archived),
            summary.count(PackStatus::Skipped),
            summary.count(PackStatus::Failed),
            summary.count(PackStatus::Planned)
        );
        Ok(summary)
    }

    /// Process `candidates` in order, isolating failures
    pub async fn process_candidates(&self, candidates: &[ProjectCandidate]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = candidates.len();

        for (index, candidate) in candidates.iter().enumerate() {
            tracing::info!("Packing {}/{}: {}", index + 1, total, candidate.name);

            let result = self.process_candidate(candidate).await;
            self.record(&result);
            summary.results.push(result);
        }

        summary
    }

    /// Take one candidate from `Pending` to a terminal stage
    pub async fn process_candidate(&self, candidate: &ProjectCandidate) -> PackResult {
        let start = Instant::now();
        let job = self.layout.job_for(candidate);
        self.state.set_stage(&candidate.name, PackStage::Pending);

        let outcome = self.pack(&job).await;
        let duration = start.elapsed();

        match outcome {
            Ok(Outcome::Archived { files, receipt }) => PackResult {
                candidate: candidate.name.clone(),
                status: PackStatus::Archived,
                message: format!(
                    "{} ({} entries, {} bytes)",
                    receipt.path, receipt.entries, receipt.bytes
                ),
                duration,
                files,
                archive_bytes: receipt.bytes,
            },
            Ok(Outcome::Skipped(reason)) => {
                self.state.set_stage(&candidate.name, PackStage::Skipped);
                PackResult {
                    candidate: candidate.name.clone(),
                    status: PackStatus::Skipped,
                    message: reason,
                    duration,
                    files: 0,
                    archive_bytes: 0,
                }
            }
            Ok(Outcome::Planned { files, note }) => PackResult {
                candidate: candidate.name.clone(),
                status: PackStatus::Planned,
                message: note,
                duration,
                files,
                archive_bytes: 0,
            },
            Err(failure) => {
                let message = failure.message();
                self.state.set_stage(
                    &candidate.name,
                    PackStage::Failed {
                        reason: message.clone(),
                    },
                );
                PackResult {
                    candidate: candidate.name.clone(),
                    status: PackStatus::Failed,
                    message,
                    duration,
                    files: failure.staged_files,
                    archive_bytes: 0,
                }
            }
        }
    }

    async fn pack(&self, job: &ArchiveJob) -> Result<Outcome, CandidateFailure> {
        let candidate = &job.candidate;

        // The marker may have been added since discovery
        if has_ignore_marker(&candidate.path, &self.exclusions) {
            return Ok(Outcome::Skipped(format!(
                "contains {}",
                self.exclusions.ignore_marker()
            )));
        }

        if self.options.dry_run {
            return Ok(self.plan(job));
        }

        let destination =
            resolve_destination(&job.archive_path, self.options.overwrite, self.prompt.as_ref())
                .map_err(CandidateFailure::new)?;

        self.state.set_stage(&candidate.name, PackStage::Staging);
        let _staging = StagingDir::claim(&job.staging_path).map_err(CandidateFailure::new)?;

        let staged = stage_directory(
            &candidate.path,
            &job.staging_path,
            &self.exclusions,
            self.observer(),
        )
        .map_err(CandidateFailure::new)?;
        let files = staged.len();
        self.metrics.record_files_staged(files);
        self.state.set_stage(&candidate.name, PackStage::Staged { files });

        if staged.is_empty() {
            tracing::warn!("No files to archive in {}, leaving it in place", candidate.path);
            return Ok(Outcome::Skipped("no files left after exclusions".to_string()));
        }
        let sample = staged.sample(FAILURE_SAMPLE_SIZE);

        self.state.set_stage(&candidate.name, PackStage::Archiving);
        prepare_destination(&job.archive_path, destination)
            .map_err(|e| CandidateFailure::with_sample(e, files, &sample))?;
        self.archiver
            .create(&job.staging_path, &job.archive_path)
            .await
            .map_err(|e| CandidateFailure::with_sample(e, files, &sample))?;
        self.state.set_stage(&candidate.name, PackStage::Archived);

        self.state.set_stage(&candidate.name, PackStage::Verifying);
        let receipt = verify_archive(&self.archiver, &job.archive_path)
            .await
            .map_err(|e| CandidateFailure::with_sample(e, files, &sample))?;
        self.state.set_stage(&candidate.name, PackStage::Verified);

        remove_source(&candidate.path).map_err(|e| {
            CandidateFailure::new(anyhow!(
                "archive {} is verified but the source {} could not be removed: {}",
                receipt.path,
                candidate.path,
                e
            ))
        })?;
        tracing::info!("Removed source directory {}", candidate.path);
        self.state.set_stage(&candidate.name, PackStage::SourceDeleted);

        Ok(Outcome::Archived { files, receipt })
    }

    /// Dry-run decision for one candidate. Reads the tree, writes nothing.
    fn plan(&self, job: &ArchiveJob) -> Outcome {
        let set = enumerate_files(&job.candidate.path, &self.exclusions, self.observer());
        if set.is_empty() {
            return Outcome::Skipped("no files left after exclusions".to_string());
        }

        let mut note = format!("would archive {} files to {}", set.len(), job.archive_path);
        if job.archive_path.exists() {
            let policy = match self.options.overwrite {
                OverwriteMode::Force => "replaced",
                OverwriteMode::NoClobber => "kept and the project would fail",
                OverwriteMode::Confirm => "replaced only if confirmed",
            };
            note.push_str(&format!("; existing archive would be {}", policy));
        }
        tracing::info!("[dry run] {}: {}", job.candidate.name, note);

        Outcome::Planned {
            files: set.len(),
            note,
        }
    }

    fn record(&self, result: &PackResult) {
        match result.status {
            PackStatus::Archived => {
                tracing::info!("{} archived: {}", result.candidate, result.message);
                self.metrics.record_archived(result.archive_bytes, result.duration);
            }
            PackStatus::Skipped => {
                tracing::warn!("{} skipped: {}", result.candidate, result.message);
                self.metrics.record_skipped();
            }
            PackStatus::Failed => {
                tracing::error!("{} failed: {}", result.candidate, result.message);
                self.metrics.record_failed();
            }
            PackStatus::Planned => self.metrics.record_planned(),
        }

        self.state
            .add_result(result.candidate.clone(), result.status, result.message.clone());
    }

    fn remove_empty_staging_root(&self) {
        let root = &self.layout.staging_root;
        if !root.is_dir() {
            return;
        }
        match fs::remove_dir(root) {
            Ok(()) => tracing::debug!("Removed staging root {}", root),
            Err(e) => tracing::debug!("Staging root {} left in place: {}", root, e),
        }
    }
}

/// Delete a source tree, retrying once after making its contents writable
fn remove_source(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(first) => {
            tracing::warn!(
                "Failed to remove {} ({}), clearing read-only flags and retrying",
                path,
                first
            );
            make_tree_writable(path.as_std_path());
            fs::remove_dir_all(path)
        }
    }
}

fn make_tree_writable(root: &std::path::Path) {
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if let Err(e) = make_writable(&dir, true) {
            tracing::debug!("Could not make {} writable: {}", dir.display(), e);
        }
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                if let Err(e) = make_writable(&entry.path(), false) {
                    tracing::debug!("Could not make {} writable: {}", entry.path().display(), e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn make_writable(path: &std::path::Path, is_dir: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::symlink_metadata(path)?.permissions().mode();
    let wanted = if is_dir { 0o700 } else { 0o600 };
    if mode & wanted != wanted {
        fs::set_permissions(path, fs::Permissions::from_mode(mode | wanted))?;
    }
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &std::path::Path, _is_dir: bool) -> io::Result<()> {
    let mut permissions = fs::symlink_metadata(path)?.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::archive::LibraryZip;
    use crate::services::prompt::MockConfirmOverwrite;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    fn write(path: Utf8PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn workflow(root: &Utf8Path) -> PackWorkflow<LibraryZip> {
        let layout = PackLayout::new(root, "compressed", "__staging_pack");
        PackWorkflow::new(
            layout,
            ExclusionConfig::default(),
            LibraryZip,
            Arc::new(StateManager::new()),
        )
    }

    #[test]
    fn test_staging_dir_guard_removes_on_drop() {
        let (_temp, root) = setup();
        let path = root.join("stage/Proj");
        {
            let _guard = StagingDir::claim(&path).unwrap();
            write(path.join("a.txt"), "A");
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_staging_dir_claim_removes_leftovers() {
        let (_temp, root) = setup();
        let path = root.join("stage/Proj");
        write(path.join("stale.txt"), "old");

        let _guard = StagingDir::claim(&path).unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_source_clears_read_only_directories() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, root) = setup();
        let src = root.join("Proj");
        write(src.join("locked/a.txt"), "A");
        fs::set_permissions(src.join("locked"), fs::Permissions::from_mode(0o500)).unwrap();

        remove_source(&src).unwrap();
        assert!(!src.exists());
    }

    #[test]
    fn test_failure_message_includes_sample() {
        let sample = ["a.txt".to_string(), "b.txt".to_string()];
        let failure = CandidateFailure::with_sample(anyhow!("boom"), 2, &sample);
        assert_eq!(failure.message(), "boom (staged files include: a.txt, b.txt)");
        assert_eq!(CandidateFailure::new(anyhow!("boom")).message(), "boom");
    }

    #[test]
    fn test_summary_counts() {
        let result = |name: &str, status| PackResult {
            candidate: name.to_string(),
            status,
            message: String::new(),
            duration: Duration::ZERO,
            files: 0,
            archive_bytes: 0,
        };
        let summary = RunSummary {
            results: vec![
                result("A", PackStatus::Archived),
                result("B", PackStatus::Failed),
                result("C", PackStatus::Archived),
            ],
        };

        assert_eq!(summary.count(PackStatus::Archived), 2);
        assert!(summary.has_failures());
        assert_eq!(summary.result("B").unwrap().status, PackStatus::Failed);
        assert!(summary.result("Z").is_none());
    }

    #[tokio::test]
    async fn test_declined_confirmation_is_a_conflict() {
        let (_temp, root) = setup();
        write(root.join("Proj/README.md"), "readme");
        write(root.join("compressed/Proj.zip"), "previous archive");

        let mut prompt = MockConfirmOverwrite::new();
        prompt.expect_confirm().times(1).return_const(false);

        let workflow = workflow(&root).with_prompt(Box::new(prompt));
        let result = workflow
            .process_candidate(&ProjectCandidate::new(root.join("Proj")))
            .await;

        assert_eq!(result.status, PackStatus::Failed);
        assert!(result.message.contains("already exists"));
        assert!(root.join("Proj/README.md").exists());
        assert!(!root.join("__staging_pack/Proj").exists());
        assert_eq!(
            fs::read_to_string(root.join("compressed/Proj.zip")).unwrap(),
            "previous archive"
        );
    }

    #[tokio::test]
    async fn test_stage_history_ends_in_source_deleted() {
        let (_temp, root) = setup();
        write(root.join("Proj/README.md"), "readme");

        let state = Arc::new(StateManager::new());
        let mut rx = state.subscribe();
        let layout = PackLayout::new(&root, "compressed", "__staging_pack");
        let workflow =
            PackWorkflow::new(layout, ExclusionConfig::default(), LibraryZip, Arc::clone(&state));

        let result = workflow
            .process_candidate(&ProjectCandidate::new(root.join("Proj")))
            .await;
        assert_eq!(result.status, PackStatus::Archived);

        let mut stages = Vec::new();
        while let Ok(change) = rx.try_recv() {
            if let crate::state::StateChange::StageChanged { stage, .. } = change {
                stages.push(stage);
            }
        }
        assert_eq!(
            stages,
            vec![
                PackStage::Pending,
                PackStage::Staging,
                PackStage::Staged { files: 1 },
                PackStage::Archiving,
                PackStage::Archived,
                PackStage::Verifying,
                PackStage::Verified,
                PackStage::SourceDeleted,
            ]
        );
    }
}
