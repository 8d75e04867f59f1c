use std::path::PathBuf;

use tatara_build::{ArchiveError, CacheError};
use tatara_engine::{ImageError, StagerError};

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error(transparent)]
    Core(#[from] tatara_core::Error),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Stager(#[from] StagerError),

    #[error("failed to write artifact to {path}")]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("artifact at {path} is {actual} bytes but the stager reported {expected}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("staging cancelled")]
    Cancelled,
}

impl StagingError {
    /// True when the run ended because a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Image(ImageError::Cancelled))
    }
}
