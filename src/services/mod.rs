//! Services module - the discovery, staging and archive engines.
//!
//! These services hold the business logic of a pack run and know nothing about
//! the command line. The [`PackWorkflow`](crate::workflow::PackWorkflow)
//! sequences them per candidate.
//!
//! # Components
//!
//! - [`discovery`]: selects project directories under the root (ignore-marker
//!   short-circuit, pruned depth-first marker search)
//! - [`staging`]: filtered enumeration, then a mirrored copy into the staging area
//! - [`archive`]: backend negotiation ([`ArchiveTool`]), zip creation, overwrite
//!   policy and integrity verification
//! - [`progress`]: update cadence and the [`ProgressObserver`] seam
//! - [`prompt`]: the interactive overwrite gate
//! - [`walk`]: directory listing shared by the traversals
//!
//! # Usage Example
//!
//! ```ignore
//! use projzip::services::{
//!     ArchiveTool, Archiver, discover_candidates, stage_directory, verify_archive,
//! };
//!
//! let candidates = discover_candidates(&layout, &exclusions, None)?;
//! let tool = ArchiveTool::negotiate(&settings).await;
//!
//! for candidate in &candidates {
//!     let job = layout.job_for(candidate);
//!     stage_directory(&candidate.path, &job.staging_path, &exclusions, None)?;
//!     tool.create(&job.staging_path, &job.archive_path).await?;
//!     verify_archive(&tool, &job.archive_path).await?;
//! }
//! ```

pub mod archive;
pub mod discovery;
pub mod progress;
pub mod prompt;
pub mod staging;
pub mod walk;

pub use archive::{
    ArchiveError, ArchiveReceipt, ArchiveTool, Archiver, CommandLineZip, Destination, LibraryZip,
    prepare_destination, resolve_destination, verify_archive,
};
pub use discovery::{DiscoveryError, discover_candidates, find_marker, has_ignore_marker};
pub use progress::{ProgressObserver, ProgressUpdate, progress_step, should_report};
pub use prompt::{ConfirmOverwrite, FixedAnswer, TerminalPrompt};
pub use staging::{StagingError, copy_files, enumerate_files, stage_directory};
pub use walk::EnumerationError;
