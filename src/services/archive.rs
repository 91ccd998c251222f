//! Zip creation and verification.
//!
//! Two backends implement [`Archiver`]: [`CommandLineZip`] drives the external
//! `zip`/`unzip` pair, [`LibraryZip`] uses the `zip` crate. [`ArchiveTool`]
//! picks one once per run by probing for the external tools.
//!
//! An archive only counts as good after [`verify_archive`] confirms it exists,
//! is larger than an empty zip, and passes the backend's integrity test.

use crate::models::{ArchiverPreference, OverwriteMode, PackSettings};
use crate::services::prompt::ConfirmOverwrite;
use crate::services::walk::{EntryKind, list_dir};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Size of a zip holding no entries (end-of-central-directory record only)
pub const EMPTY_ZIP_BYTES: u64 = 22;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from archive creation and verification. None of them permit
/// deleting the source.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{tool} failed (exit code {code:?}): {output}")]
    ToolInvocation {
        tool: String,
        code: Option<i32>,
        output: String,
    },

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("Archive {0} was not created")]
    ArchiveMissing(Utf8PathBuf),

    #[error("Archive {path} failed verification: {reason}")]
    VerificationFailed { path: Utf8PathBuf, reason: String },

    #[error("Archive {0} already exists")]
    OverwriteConflict(Utf8PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Confirmation that an archive was created and verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub path: Utf8PathBuf,
    pub bytes: u64,
    pub entries: usize,
}

/// Common interface of the archiving backends
#[allow(async_fn_in_trait)]
pub trait Archiver {
    fn name(&self) -> &'static str;

    /// Write every file under `staged_dir` into a new zip at `destination`,
    /// with entry names relative to `staged_dir`.
    async fn create(
        &self,
        staged_dir: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), ArchiveError>;

    /// Integrity-test `archive`. Returns the number of entries checked.
    async fn verify(&self, archive: &Utf8Path) -> Result<usize, ArchiveError>;
}

/// How an existing destination will be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Fresh,
    Replace,
}

/// Apply the overwrite policy to `archive` without touching the filesystem.
///
/// # Errors
///
/// [`ArchiveError::OverwriteConflict`] when the archive exists and the policy
/// (or the user, in confirm mode) refuses to replace it.
pub fn resolve_destination(
    archive: &Utf8Path,
    mode: OverwriteMode,
    prompt: &dyn ConfirmOverwrite,
) -> Result<Destination, ArchiveError> {
    if !archive.exists() {
        return Ok(Destination::Fresh);
    }

    match mode {
        OverwriteMode::Force => Ok(Destination::Replace),
        OverwriteMode::NoClobber => Err(ArchiveError::OverwriteConflict(archive.to_path_buf())),
        OverwriteMode::Confirm => {
            if prompt.confirm(archive) {
                Ok(Destination::Replace)
            } else {
                Err(ArchiveError::OverwriteConflict(archive.to_path_buf()))
            }
        }
    }
}

/// Create the archive directory and remove a replaced archive
pub fn prepare_destination(
    archive: &Utf8Path,
    destination: Destination,
) -> Result<(), ArchiveError> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent)?;
    }
    if destination == Destination::Replace && archive.exists() {
        fs::remove_file(archive)?;
        tracing::debug!("Removed existing archive {}", archive);
    }
    Ok(())
}

/// Check the archive file itself, then run the backend's integrity test
pub async fn verify_archive<A: Archiver>(
    archiver: &A,
    archive: &Utf8Path,
) -> Result<ArchiveReceipt, ArchiveError> {
    let bytes = check_archive_file(archive)?;
    let entries = archiver.verify(archive).await?;
    if entries == 0 {
        return Err(ArchiveError::VerificationFailed {
            path: archive.to_path_buf(),
            reason: "archive contains no entries".to_string(),
        });
    }

    tracing::info!(
        "Verified {} ({} entries, {} bytes) with {}",
        archive,
        entries,
        bytes,
        archiver.name()
    );
    Ok(ArchiveReceipt {
        path: archive.to_path_buf(),
        bytes,
        entries,
    })
}

/// The archive must be a regular file larger than an empty zip. Returns its size.
pub fn check_archive_file(archive: &Utf8Path) -> Result<u64, ArchiveError> {
    let meta = match fs::metadata(archive) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArchiveError::ArchiveMissing(archive.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if !meta.is_file() {
        return Err(ArchiveError::ArchiveMissing(archive.to_path_buf()));
    }
    if meta.len() <= EMPTY_ZIP_BYTES {
        return Err(ArchiveError::VerificationFailed {
            path: archive.to_path_buf(),
            reason: format!("archive is only {} bytes", meta.len()),
        });
    }
    Ok(meta.len())
}

/// The backend chosen for a run
#[derive(Debug)]
pub enum ArchiveTool {
    CommandLine(CommandLineZip),
    Library(LibraryZip),
}

impl ArchiveTool {
    /// Probe for the external tools according to `settings.archiver`.
    ///
    /// Falls back to the library when `zip` cannot be run. `unzip` is optional;
    /// without it verification uses the library reader.
    pub async fn negotiate(settings: &PackSettings) -> Self {
        if settings.archiver == ArchiverPreference::Library {
            tracing::info!("Using library zip backend (configured)");
            return Self::library();
        }

        if !probe(&settings.zip_program, "-h").await {
            if settings.archiver == ArchiverPreference::CommandLine {
                tracing::warn!(
                    "Command-line archiver requested but '{}' is not available",
                    settings.zip_program
                );
            }
            tracing::info!("Using library zip backend ('{}' not found)", settings.zip_program);
            return Self::library();
        }

        let unzip = if probe(&settings.unzip_program, "-v").await {
            Some(settings.unzip_program.clone())
        } else {
            tracing::info!(
                "'{}' not found, archives will be verified with the library reader",
                settings.unzip_program
            );
            None
        };

        tracing::info!("Using command-line zip backend: {}", settings.zip_program);
        Self::CommandLine(CommandLineZip::new(
            settings.zip_program.clone(),
            unzip,
            settings.compression_level,
            Duration::from_secs(settings.tool_timeout_secs),
        ))
    }

    pub fn library() -> Self {
        Self::Library(LibraryZip)
    }
}

impl Archiver for ArchiveTool {
    fn name(&self) -> &'static str {
        match self {
            Self::CommandLine(tool) => tool.name(),
            Self::Library(tool) => tool.name(),
        }
    }

    async fn create(
        &self,
        staged_dir: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        match self {
            Self::CommandLine(tool) => tool.create(staged_dir, destination).await,
            Self::Library(tool) => tool.create(staged_dir, destination).await,
        }
    }

    async fn verify(&self, archive: &Utf8Path) -> Result<usize, ArchiveError> {
        match self {
            Self::CommandLine(tool) => tool.verify(archive).await,
            Self::Library(tool) => tool.verify(archive).await,
        }
    }
}

/// External `zip` for creation and `unzip -t` for verification
#[derive(Debug)]
pub struct CommandLineZip {
    zip_program: String,
    unzip_program: Option<String>,
    level: u8,
    timeout: Duration,

    /// Matches `testing: <name>   OK` lines in `unzip -t` output
    tested_entry_pattern: Regex,
}

impl CommandLineZip {
    pub fn new(
        zip_program: String,
        unzip_program: Option<String>,
        level: u8,
        timeout: Duration,
    ) -> Self {
        Self {
            zip_program,
            unzip_program,
            level: level.min(9),
            timeout,
            tested_entry_pattern: Regex::new(r"(?m)^\s*testing:\s+(.+?)\s+OK\s*$")
                .expect("Invalid unzip test regex"),
        }
    }

    /// Count entries reported OK in `unzip -t` output
    pub fn count_tested_entries(&self, output: &str) -> usize {
        self.tested_entry_pattern.find_iter(output).count()
    }
}

impl Archiver for CommandLineZip {
    fn name(&self) -> &'static str {
        "zip command"
    }

    async fn create(
        &self,
        staged_dir: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        let destination = absolute(destination)?;
        let level = format!("-{}", self.level);
        let args = ["-r", "-q", "-D", level.as_str(), destination.as_str(), "."];

        let output = run_tool(&self.zip_program, &args, Some(staged_dir), self.timeout).await?;
        if !output.status.success() {
            return Err(ArchiveError::ToolInvocation {
                tool: self.zip_program.clone(),
                code: output.status.code(),
                output: combined_output(&output),
            });
        }
        Ok(())
    }

    async fn verify(&self, archive: &Utf8Path) -> Result<usize, ArchiveError> {
        let Some(unzip) = &self.unzip_program else {
            return LibraryZip.verify(archive).await;
        };

        let output = run_tool(unzip, &["-t", archive.as_str()], None, self.timeout).await?;
        let text = combined_output(&output);
        if !output.status.success() {
            return Err(ArchiveError::VerificationFailed {
                path: archive.to_path_buf(),
                reason: format!("{} -t exited with {:?}: {}", unzip, output.status.code(), text),
            });
        }

        Ok(self.count_tested_entries(&text))
    }
}

/// In-process zip writer and reader
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryZip;

impl LibraryZip {
    fn write_archive(
        &self,
        staged_dir: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<usize, ArchiveError> {
        let files = collect_files(staged_dir).map_err(library_failure)?;

        let file = File::create(destination).map_err(library_failure)?;
        let mut writer = ZipWriter::new(BufWriter::new(file));

        for path in &files {
            let relative = path.strip_prefix(staged_dir).map_err(library_failure)?;
            let name = zip_entry_name(relative);
            let len = fs::metadata(path).map_err(library_failure)?.len();

            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(len >= u64::from(u32::MAX));
            writer.start_file(name, options).map_err(library_failure)?;

            let mut source = File::open(path).map_err(library_failure)?;
            io::copy(&mut source, &mut writer).map_err(library_failure)?;
        }

        let mut inner = writer.finish().map_err(library_failure)?;
        inner.flush().map_err(library_failure)?;
        Ok(files.len())
    }

    fn read_archive(&self, archive: &Utf8Path) -> Result<usize, ArchiveError> {
        let failed = |reason: String| ArchiveError::VerificationFailed {
            path: archive.to_path_buf(),
            reason,
        };

        let file = File::open(archive).map_err(|e| failed(e.to_string()))?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| failed(e.to_string()))?;
        if zip.is_empty() {
            return Err(failed("archive contains no entries".to_string()));
        }

        // Reading each entry to the end makes the reader check its CRC
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|e| failed(e.to_string()))?;
            let name = entry.name().to_string();
            io::copy(&mut entry, &mut io::sink()).map_err(|e| failed(format!("{}: {}", name, e)))?;
        }

        Ok(zip.len())
    }
}

impl Archiver for LibraryZip {
    fn name(&self) -> &'static str {
        "zip library"
    }

    async fn create(
        &self,
        staged_dir: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        let start = Instant::now();
        let count = self.write_archive(staged_dir, destination)?;
        tracing::debug!(
            "Library zip wrote {} entries to {} in {:.2}s",
            count,
            destination,
            start.elapsed().as_secs_f32()
        );
        Ok(())
    }

    async fn verify(&self, archive: &Utf8Path) -> Result<usize, ArchiveError> {
        self.read_archive(archive)
    }
}

/// Run `program` with an informational flag to see if it exists.
///
/// `zip -v` without a terminal on stdout compresses stdin instead of
/// printing version info, so zip is probed with `-h`.
pub async fn probe(program: &str, flag: &str) -> bool {
    let mut cmd = Command::new(program);
    cmd.arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match timeout(PROBE_TIMEOUT, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::debug!("Probe of '{}' failed: {}", program, e);
            false
        }
        Err(_) => {
            tracing::debug!("Probe of '{}' timed out", program);
            false
        }
    }
}

async fn run_tool(
    program: &str,
    args: &[&str],
    cwd: Option<&Utf8Path>,
    timeout_duration: Duration,
) -> Result<std::process::Output, ArchiveError> {
    tracing::debug!("Executing: {} {}", program, args.join(" "));
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = timeout(timeout_duration, cmd.output())
        .await
        .map_err(|_| {
            tracing::warn!("{} timed out after {:?}", program, timeout_duration);
            ArchiveError::Timeout {
                tool: program.to_string(),
                after: timeout_duration,
            }
        })?
        .map_err(|e| ArchiveError::ToolInvocation {
            tool: program.to_string(),
            code: None,
            output: e.to_string(),
        })?;

    tracing::debug!(
        "{} completed in {:.2}s with exit code {:?}",
        program,
        start.elapsed().as_secs_f32(),
        output.status.code()
    );
    Ok(output)
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{}\n{}", out, err),
    }
}

fn library_failure(e: impl Display) -> ArchiveError {
    ArchiveError::ToolInvocation {
        tool: "zip library".to_string(),
        code: None,
        output: e.to_string(),
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, ArchiveError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()?;
    let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|p| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("working directory is not UTF-8: {}", p.display()),
        )
    })?;
    Ok(cwd.join(path))
}

/// Zip entry names always use `/`
fn zip_entry_name(relative: &Utf8Path) -> String {
    relative
        .components()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every regular file under `dir`. Unlike discovery, an unreadable directory is an error.
fn collect_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, io::Error> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries =
            list_dir(&current).map_err(|e| io::Error::new(e.source.kind(), e.to_string()))?;
        for entry in entries {
            match entry.kind {
                EntryKind::Dir => stack.push(entry.path),
                EntryKind::File => files.push(entry.path),
                EntryKind::Other => {}
            }
        }
    }

    files.sort();
    Ok(files)
}
