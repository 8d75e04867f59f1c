use std::fmt;
use std::pin::Pin;

use tokio_stream::Stream;

use crate::docker::DockerError;

/// One structured message from an image pull or build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Layer status, e.g. `a3ed95caeb02: Pull complete`
    Status { id: Option<String>, status: String },
    /// Build output line
    Stream(String),
    /// Engine-reported failure; the operation did not succeed
    Error(String),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { id: Some(id), status } => write!(f, "{id}: {status}"),
            Self::Status { id: None, status } => f.write_str(status),
            Self::Stream(line) => f.write_str(line),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Progress of a pull or build. Dropping the stream aborts the operation.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<Progress, DockerError>> + Send>>;

/// How build progress is surfaced while it is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Print every progress line to stdout
    Verbose,
    /// Drain silently
    Quiet,
}
