use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings loaded from `projzip.yaml` and `PROJZIP_*` environment variables.
///
/// Every field has a default so a missing or partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackSettings {
    /// Filenames whose presence anywhere in a directory tree marks it as a project
    pub markers: Vec<String>,

    /// Directory names skipped together with their whole subtree
    pub excluded_dirs: Vec<String>,

    /// File extensions left out of the staged copy
    pub excluded_extensions: Vec<String>,

    /// Entry name that excludes a directory when present as an immediate child
    pub ignore_marker: String,

    /// Archive destination directory, relative to the scanned root
    pub archive_dir: String,

    /// Staging root, relative to the scanned root
    pub staging_dir: String,

    pub archiver: ArchiverPreference,

    pub zip_program: String,
    pub unzip_program: String,

    /// Level passed to the command-line zip tool
    pub compression_level: u8,

    /// Maximum time for a single external tool invocation
    pub tool_timeout_secs: u64,

    pub debug_mode: bool,

    /// Log directory; the platform state directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

impl Default for PackSettings {
    fn default() -> Self {
        Self {
            markers: to_strings(&[
                "README.md",
                "package.json",
                "manifest.json",
                "Cargo.toml",
                "pyproject.toml",
                "setup.py",
                "requirements.txt",
                "go.mod",
                "pom.xml",
                "build.gradle",
                "composer.json",
                "Gemfile",
                "CMakeLists.txt",
                "Makefile",
            ]),
            excluded_dirs: to_strings(&[
                "node_modules",
                ".git",
                ".svn",
                ".hg",
                ".vs",
                ".idea",
                ".vscode",
                "__pycache__",
                ".venv",
                "venv",
                "target",
                "bin",
                "obj",
                "dist",
                "build",
                ".next",
                ".cache",
            ]),
            excluded_extensions: Vec::new(),
            ignore_marker: ".zipignore".to_string(),
            archive_dir: "compressed".to_string(),
            staging_dir: "__staging_pack".to_string(),
            archiver: ArchiverPreference::Auto,
            zip_program: "zip".to_string(),
            unzip_program: "unzip".to_string(),
            compression_level: 3,
            tool_timeout_secs: 3600,
            debug_mode: false,
            log_dir: None,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Which archiving backend the run should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiverPreference {
    /// Probe for the command-line tools, fall back to the library
    #[default]
    Auto,
    CommandLine,
    Library,
}

impl FromStr for ArchiverPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "command-line" | "commandline" | "cli" => Ok(Self::CommandLine),
            "library" | "lib" => Ok(Self::Library),
            other => Err(format!("unknown archiver '{}'", other)),
        }
    }
}

impl fmt::Display for ArchiverPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::CommandLine => "command-line",
            Self::Library => "library",
        };
        f.write_str(name)
    }
}

/// What to do when the destination archive already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwriteMode {
    /// Remove the existing archive unconditionally
    Force,
    /// Fail the candidate with a conflict
    NoClobber,
    /// Ask interactively; declining is a conflict
    #[default]
    Confirm,
}

impl OverwriteMode {
    /// Resolve the mode from the two mutually exclusive command-line switches
    pub fn from_flags(force: bool, no_clobber: bool) -> Self {
        match (force, no_clobber) {
            (true, _) => Self::Force,
            (false, true) => Self::NoClobber,
            (false, false) => Self::Confirm,
        }
    }
}
