//! Filtered copy of a candidate tree into a staging directory.
//!
//! Staging runs in two passes: [`enumerate_files`] builds the full
//! [`StagedFileSet`] first, then [`copy_files`] mirrors it into the destination.
//! The file count is known before the first copy starts.

use crate::models::{ExclusionConfig, ProgressPhase, StagedFileSet};
use crate::services::progress::{self, ProgressObserver};
use crate::services::walk::{EntryKind, list_dir};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create staging directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} is outside the staged tree")]
    OutsideRoot(Utf8PathBuf),
}

/// Collect every file under `source` that survives the exclusion rules.
///
/// Pruned directories are skipped with their whole subtree. A directory that
/// cannot be listed is recorded in `unreadable_dirs` and the walk continues.
pub fn enumerate_files(
    source: &Utf8Path,
    exclusions: &ExclusionConfig,
    observer: Option<&dyn ProgressObserver>,
) -> StagedFileSet {
    let mut set = StagedFileSet {
        root: source.to_path_buf(),
        ..Default::default()
    };
    let mut stack = vec![source.to_path_buf()];
    let mut visited = 0usize;

    while let Some(dir) = stack.pop() {
        let entries = match list_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("{}", e);
                set.unreadable_dirs.push(e.path);
                continue;
            }
        };

        visited += 1;
        // Total is unknown during the walk; report against the running count
        progress::report(observer, ProgressPhase::Enumeration, visited, visited + stack.len(), || {
            dir.to_string()
        });

        for entry in entries {
            match entry.kind {
                EntryKind::Dir if exclusions.is_excluded_dir(&entry.name) => {
                    tracing::trace!("Pruned {}", entry.path);
                }
                EntryKind::Dir => stack.push(entry.path),
                EntryKind::File if exclusions.is_excluded_file(&entry.name) => {
                    tracing::trace!("Excluded by extension: {}", entry.path);
                }
                EntryKind::File => set.files.push(entry.path),
                EntryKind::Other => {}
            }
        }
    }

    set.files.sort();
    tracing::debug!(
        "Enumerated {} files under {} ({} unreadable directories)",
        set.files.len(),
        source,
        set.unreadable_dirs.len()
    );
    set
}

/// Copy every file in `set` to the same relative path under `destination`.
///
/// Intermediate directories are created on demand and existing files are
/// overwritten. Returns the number of files copied.
///
/// # Errors
///
/// The first file that cannot be copied aborts the copy with
/// [`StagingError::Copy`].
pub fn copy_files(
    set: &StagedFileSet,
    destination: &Utf8Path,
    observer: Option<&dyn ProgressObserver>,
) -> Result<usize, StagingError> {
    let total = set.len();

    for (index, file) in set.files.iter().enumerate() {
        let relative = set
            .relative(file)
            .ok_or_else(|| StagingError::OutsideRoot(file.clone()))?;
        let target = destination.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| StagingError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::copy(file, &target).map_err(|source| StagingError::Copy {
            from: file.clone(),
            to: target.clone(),
            source,
        })?;

        progress::report(observer, ProgressPhase::Copy, index + 1, total, || {
            relative.to_string()
        });
    }

    Ok(total)
}

/// Enumerate then copy. Returns the file set so callers can report on it.
pub fn stage_directory(
    source: &Utf8Path,
    destination: &Utf8Path,
    exclusions: &ExclusionConfig,
    observer: Option<&dyn ProgressObserver>,
) -> Result<StagedFileSet, StagingError> {
    let set = enumerate_files(source, exclusions, observer);
    if set.is_empty() {
        return Ok(set);
    }

    fs::create_dir_all(destination).map_err(|source| StagingError::CreateDir {
        path: destination.to_path_buf(),
        source,
    })?;
    let copied = copy_files(&set, destination, observer)?;
    tracing::info!("Staged {} files from {} into {}", copied, source, destination);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn relative_names(set: &StagedFileSet) -> Vec<String> {
        set.files
            .iter()
            .map(|f| set.relative(f).unwrap().as_str().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_enumerate_prunes_and_filters() {
        let (_temp, root) = setup();
        let src = root.join("Proj");
        write(src.join("README.md"), "readme");
        write(src.join("src/main.rs"), "fn main() {}");
        write(src.join("debug.LOG"), "noise");
        write(src.join("node_modules/pkg/index.js"), "deps");
        write(src.join("sub/.git/config"), "git");

        let exclusions =
            ExclusionConfig::new(["README.md"], ["node_modules", ".git"], ["log"], ".zipignore");
        let set = enumerate_files(&src, &exclusions, None);

        assert_eq!(relative_names(&set), vec!["README.md", "src/main.rs"]);
        assert!(set.unreadable_dirs.is_empty());
    }

    #[test]
    fn test_enumerate_missing_source_records_unreadable() {
        let (_temp, root) = setup();
        let set = enumerate_files(&root.join("missing"), &ExclusionConfig::default(), None);

        assert!(set.is_empty());
        assert_eq!(set.unreadable_dirs, vec![root.join("missing")]);
    }

    #[test]
    fn test_stage_mirrors_relative_paths() {
        let (_temp, root) = setup();
        let src = root.join("Proj");
        let dst = root.join("stage/Proj");
        write(src.join("a.txt"), "A");
        write(src.join("nested/deeper/b.txt"), "B");

        let set = stage_directory(&src, &dst, &ExclusionConfig::default(), None).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "A");
        assert_eq!(fs::read_to_string(dst.join("nested/deeper/b.txt")).unwrap(), "B");
    }

    #[test]
    fn test_restaging_overwrites_idempotently() {
        let (_temp, root) = setup();
        let src = root.join("Proj");
        let dst = root.join("stage/Proj");
        write(src.join("a.txt"), "first");

        stage_directory(&src, &dst, &ExclusionConfig::default(), None).unwrap();
        write(dst.join("a.txt"), "tampered");
        let set = stage_directory(&src, &dst, &ExclusionConfig::default(), None).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "first");
        assert_eq!(fs::read_dir(&dst).unwrap().count(), 1);
    }

    #[test]
    fn test_empty_tree_stages_nothing() {
        let (_temp, root) = setup();
        let src = root.join("Proj");
        let dst = root.join("stage/Proj");
        write(src.join("node_modules/x.js"), "x");

        let set = stage_directory(&src, &dst, &ExclusionConfig::default(), None).unwrap();

        assert!(set.is_empty());
        assert!(!dst.exists());
    }

    #[test]
    fn test_copy_failure_is_reported() {
        let (_temp, root) = setup();
        let src = root.join("Proj");
        write(src.join("a.txt"), "A");
        let mut set = enumerate_files(&src, &ExclusionConfig::default(), None);
        set.files.push(src.join("vanished.txt"));

        let err = copy_files(&set, &root.join("stage"), None).unwrap_err();
        assert!(matches!(
            err,
            StagingError::Copy { ref from, .. } if from.ends_with("vanished.txt")
        ));
    }

    #[test]
    fn test_copy_reports_progress() {
        use crate::services::progress::MockProgressObserver;

        let (_temp, root) = setup();
        let src = root.join("Proj");
        for i in 0..3 {
            write(src.join(format!("f{}.txt", i)), "x");
        }
        let set = enumerate_files(&src, &ExclusionConfig::default(), None);

        let mut observer = MockProgressObserver::new();
        observer
            .expect_notify()
            .withf(|u| u.phase == ProgressPhase::Copy)
            .times(3)
            .return_const(());

        assert_eq!(copy_files(&set, &root.join("stage"), Some(&observer)).unwrap(), 3);
    }
}
