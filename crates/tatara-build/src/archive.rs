use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

/// File-name patterns never included in an app archive.
///
/// Patterns match the entry's file name only, never its path, so a
/// reserved name is excluded at any nesting depth.
#[derive(Debug, Clone, Default)]
pub struct ExcludePatterns {
    patterns: Vec<Regex>,
}

impl ExcludePatterns {
    pub fn new(patterns: &[&str]) -> Result<Self, ArchiveError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ArchiveError::InvalidPattern {
                    pattern: (*p).to_owned(),
                    source: e,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// Excludes the staged artifact (`<app>.<ext>`) and the build cache
    /// (`.<app>.cache`) written by previous runs.
    pub fn for_app(app_name: &str, artifact_extension: &str) -> Result<Self, ArchiveError> {
        let app = regex::escape(app_name);
        let ext = regex::escape(artifact_extension);
        let artifact = format!(r"^{app}\.{ext}$");
        let cache = format!(r"^\.{app}\.cache$");
        Self::new(&[artifact.as_str(), cache.as_str()])
    }

    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(file_name))
    }
}

/// A tar of the application tree, spooled into an anonymous temporary file.
///
/// The file is positioned at the start of the archive and removed when the
/// value is dropped.
#[derive(Debug)]
pub struct AppArchive {
    file: File,
    entries: Vec<String>,
}

impl AppArchive {
    /// Archived entry names, relative to the application root.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

/// Archives every regular file under `root` whose name is not excluded.
///
/// Symlinks, devices, sockets and other non-regular entries are skipped.
/// Any I/O error aborts the archive and discards what was written.
pub fn archive_app(root: &Path, excludes: &ExcludePatterns) -> Result<AppArchive, ArchiveError> {
    let file = tempfile::tempfile().map_err(|e| ArchiveError::Spool { source: e })?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);

    let entries = append_tree(&mut builder, root, excludes)?;

    let mut file = builder
        .into_inner()
        .map_err(|e| ArchiveError::Write {
            path: root.to_path_buf(),
            source: e,
        })?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| ArchiveError::Spool { source: e })?;

    tracing::debug!(root = %root.display(), files = entries.len(), "app archived");
    Ok(AppArchive { file, entries })
}

/// Tars a whole directory tree into memory.
pub fn tar_directory(root: &Path) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    append_tree(&mut builder, root, &ExcludePatterns::default())?;
    builder.into_inner().map_err(|e| ArchiveError::Write {
        path: root.to_path_buf(),
        source: e,
    })
}

fn append_tree<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    excludes: &ExcludePatterns,
) -> Result<Vec<String>, ArchiveError> {
    let mut names = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ArchiveError::Walk {
            path: e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf),
            source: e,
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if excludes.is_excluded(&file_name) {
            tracing::debug!(path = %entry.path().display(), "excluded from archive");
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ArchiveError::OutsideRoot {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
        let name = archive_name(relative);

        builder
            .append_path_with_name(entry.path(), &name)
            .map_err(|e| ArchiveError::Write {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
        names.push(name);
    }

    Ok(names)
}

/// Entry name with `/` separators regardless of platform.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid exclude pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("failed to walk {path}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("{path} is outside the archive root")]
    OutsideRoot {
        path: PathBuf,
        source: std::path::StripPrefixError,
    },
    #[error("failed to archive {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to spool archive to a temporary file")]
    Spool { source: std::io::Error },
}
