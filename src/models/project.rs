use camino::{Utf8Path, Utf8PathBuf};

/// A project directory selected during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCandidate {
    pub path: Utf8PathBuf,
    pub name: String,
}

impl ProjectCandidate {
    pub fn new(path: Utf8PathBuf) -> Self {
        let name = path.file_name().unwrap_or(path.as_str()).to_string();
        Self { path, name }
    }
}

/// Files chosen for staging from one candidate tree.
///
/// `files` holds absolute paths under `root`, sorted. Directories that could
/// not be read are listed in `unreadable_dirs`; their content is missing from
/// `files`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedFileSet {
    pub root: Utf8PathBuf,
    pub files: Vec<Utf8PathBuf>,
    pub unreadable_dirs: Vec<Utf8PathBuf>,
}

impl StagedFileSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of `file` relative to the candidate root
    pub fn relative<'a>(&self, file: &'a Utf8Path) -> Option<&'a Utf8Path> {
        file.strip_prefix(&self.root).ok()
    }

    /// Up to `limit` relative paths, for diagnostics
    pub fn sample(&self, limit: usize) -> Vec<String> {
        self.files
            .iter()
            .take(limit)
            .map(|f| self.relative(f).unwrap_or(f.as_path()).to_string())
            .collect()
    }
}

/// One candidate bound to its archive destination and staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub candidate: ProjectCandidate,
    pub archive_path: Utf8PathBuf,
    pub staging_path: Utf8PathBuf,
}

/// Where the run writes archives and staging copies under the scanned root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLayout {
    pub root: Utf8PathBuf,
    pub archive_dir: Utf8PathBuf,
    pub staging_root: Utf8PathBuf,
}

impl PackLayout {
    pub fn new(root: impl Into<Utf8PathBuf>, archive_dir: &str, staging_dir: &str) -> Self {
        let root = root.into();
        Self {
            archive_dir: root.join(archive_dir),
            staging_root: root.join(staging_dir),
            root,
        }
    }

    pub fn job_for(&self, candidate: &ProjectCandidate) -> ArchiveJob {
        ArchiveJob {
            candidate: candidate.clone(),
            archive_path: self.archive_dir.join(format!("{}.zip", candidate.name)),
            staging_path: self.staging_root.join(&candidate.name),
        }
    }

    /// True for the archive and staging directories themselves
    pub fn is_reserved(&self, path: &Utf8Path) -> bool {
        path == self.archive_dir.as_path() || path == self.staging_root.as_path()
    }
}
