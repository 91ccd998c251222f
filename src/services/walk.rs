//! Directory listing shared by discovery, staging and the library archiver.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

/// A directory could not be listed. Traversals treat it as empty and move on.
#[derive(Error, Debug)]
#[error("Failed to enumerate {path}: {source}")]
pub struct EnumerationError {
    pub path: Utf8PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    /// Symlinked directories, dangling links, sockets and the like
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: Utf8PathBuf,
    pub name: String,
    pub kind: EntryKind,
}

/// List the immediate children of `dir`.
///
/// Symlinks are never reported as directories so callers cannot loop through
/// them; a link to a regular file is reported as a file. Entries whose names
/// are not UTF-8 are dropped with a warning.
pub fn list_dir(dir: &Utf8Path) -> Result<Vec<WalkEntry>, EnumerationError> {
    let read_dir = fs::read_dir(dir).map_err(|source| EnumerationError {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry in {}: {}", dir, e);
                continue;
            }
        };

        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(raw) => {
                tracing::warn!("Skipping non UTF-8 path: {}", raw.display());
                continue;
            }
        };
        let Some(name) = path.file_name().map(str::to_string) else {
            continue;
        };

        let kind = match entry.file_type() {
            Ok(ft) if ft.is_dir() => EntryKind::Dir,
            Ok(ft) if ft.is_file() => EntryKind::File,
            Ok(ft) if ft.is_symlink() => match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => EntryKind::File,
                Ok(_) => EntryKind::Other,
                Err(e) => {
                    tracing::warn!("Skipping dangling link {}: {}", path, e);
                    EntryKind::Other
                }
            },
            Ok(_) => EntryKind::Other,
            Err(e) => {
                tracing::debug!("Cannot read file type of {}: {}", path, e);
                EntryKind::Other
            }
        };

        entries.push(WalkEntry { path, name, kind });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_dir_kinds() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("file.txt"), b"x").unwrap();

        let mut entries = list_dir(&root).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "file.txt");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].name, "sub");
        assert_eq!(entries[1].kind, EntryKind::Dir);
    }

    #[test]
    fn test_list_missing_dir_is_enumeration_error() {
        let temp = TempDir::new().unwrap();
        let missing = Utf8PathBuf::try_from(temp.path().join("nope")).unwrap();

        let err = list_dir(&missing).unwrap_err();
        assert_eq!(err.path, missing);
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_dir_is_not_followed() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::create_dir(root.join("real")).unwrap();
        fs::write(root.join("real/a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("loop")).unwrap();
        std::os::unix::fs::symlink(root.join("real/a.txt"), root.join("link.txt")).unwrap();

        let entries = list_dir(&root).unwrap();
        let kind_of = |name: &str| entries.iter().find(|e| e.name == name).unwrap().kind;

        assert_eq!(kind_of("real"), EntryKind::Dir);
        assert_eq!(kind_of("loop"), EntryKind::Other);
        assert_eq!(kind_of("link.txt"), EntryKind::File);
    }
}
