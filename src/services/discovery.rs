//! Project discovery under a scanned root.
//!
//! A top-level directory is selected when it has no ignore marker as an
//! immediate child and a marker file exists somewhere in its tree outside the
//! pruned directories. The marker search is a depth-first walk over an explicit
//! stack and stops at the first marker found.
//!
//! ```ignore
//! let layout = PackLayout::new(root, "compressed", "__staging_pack");
//! let candidates = discover_candidates(&layout, &exclusions, None)?;
//! ```

use crate::models::{ExclusionConfig, PackLayout, ProgressPhase, ProjectCandidate};
use crate::services::progress::{self, ProgressObserver};
use crate::services::walk::{EntryKind, list_dir};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Root directory {path} is not usable: {reason}")]
    RootInvalid { path: Utf8PathBuf, reason: String },
}

/// Find the project directories directly under `layout.root`.
///
/// The archive and staging directories are never returned. Results are
/// ordered by directory name, case-insensitive.
///
/// # Errors
///
/// [`DiscoveryError::RootInvalid`] when the root is missing, not a directory,
/// or cannot be listed. Unreadable directories below the root only shrink the
/// search.
pub fn discover_candidates(
    layout: &PackLayout,
    exclusions: &ExclusionConfig,
    observer: Option<&dyn ProgressObserver>,
) -> Result<Vec<ProjectCandidate>, DiscoveryError> {
    let root = &layout.root;
    if !root.is_dir() {
        return Err(DiscoveryError::RootInvalid {
            path: root.clone(),
            reason: "not an existing directory".to_string(),
        });
    }

    let entries = list_dir(root).map_err(|e| DiscoveryError::RootInvalid {
        path: root.clone(),
        reason: e.source.to_string(),
    })?;

    let mut top_level: Vec<Utf8PathBuf> = entries
        .into_iter()
        .filter(|e| e.kind == EntryKind::Dir && !layout.is_reserved(&e.path))
        .map(|e| e.path)
        .collect();
    top_level.sort_by_key(|p| p.file_name().unwrap_or_default().to_lowercase());

    let total = top_level.len();
    tracing::info!("Scanning {} top-level directories under {}", total, root);

    let mut candidates = Vec::new();
    for (index, dir) in top_level.into_iter().enumerate() {
        progress::report(observer, ProgressPhase::Discovery, index + 1, total, || {
            dir.file_name().unwrap_or(dir.as_str()).to_string()
        });

        if has_ignore_marker(&dir, exclusions) {
            tracing::info!("Skipping {} (contains {})", dir, exclusions.ignore_marker());
            continue;
        }

        match find_marker(&dir, exclusions) {
            Some(marker) => {
                tracing::debug!("Selected {} (marker: {})", dir, marker);
                candidates.push(ProjectCandidate::new(dir));
            }
            None => tracing::debug!("No marker found in {}", dir),
        }
    }

    tracing::info!("Discovered {} project(s)", candidates.len());
    Ok(candidates)
}

/// True when `dir` has an immediate child (file or directory) named like the ignore marker.
///
/// An unreadable directory is reported as not ignored; the marker search that
/// follows will not select it either.
pub fn has_ignore_marker(dir: &Utf8Path, exclusions: &ExclusionConfig) -> bool {
    match list_dir(dir) {
        Ok(entries) => entries.iter().any(|e| exclusions.is_ignore_marker(&e.name)),
        Err(e) => {
            tracing::debug!("{}", e);
            false
        }
    }
}

/// Depth-first search for the first marker file under `dir`.
///
/// Pruned directories are never pushed, so nothing below them is visited.
/// Directory enumeration order is whatever the filesystem returns.
pub fn find_marker(dir: &Utf8Path, exclusions: &ExclusionConfig) -> Option<Utf8PathBuf> {
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = match list_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        for entry in entries {
            match entry.kind {
                EntryKind::Dir => {
                    if exclusions.is_excluded_dir(&entry.name) {
                        tracing::trace!("Pruned {}", entry.path);
                    } else {
                        stack.push(entry.path);
                    }
                }
                EntryKind::File if exclusions.is_marker(&entry.name) => {
                    return Some(entry.path);
                }
                _ => {}
            }
        }
    }

    None
}
