use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// The persistent build cache of one application.
///
/// The blob is opaque here: only the stager reads or rewrites it. This type
/// opens (or creates) the file and records whether it was empty at open
/// time, so restore can be skipped on a first build.
#[derive(Debug)]
pub struct Cache {
    file: File,
    path: PathBuf,
    len: u64,
}

impl Cache {
    /// Cache file name for an application, e.g. `.myapp.cache`.
    pub fn file_name(app_name: &str) -> String {
        format!(".{app_name}.cache")
    }

    /// Open the cache file for reading and writing, creating it if absent.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CacheError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
        let len = file
            .metadata()
            .map_err(|e| CacheError::Open {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();

        tracing::debug!(path = %path.display(), bytes = len, "cache opened");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
        })
    }

    /// True when the cache held no bytes at open time.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to open cache file {path}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}
