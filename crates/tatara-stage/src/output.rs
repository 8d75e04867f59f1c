use std::path::Path;

use tatara_core::StopSignal;
use tatara_engine::Artifact;
use tokio::io::AsyncWriteExt;

use crate::error::StagingError;

/// Write a staged artifact to `path`.
///
/// Bytes land in a temporary file next to `path` that is renamed into place
/// only once the full, correctly sized artifact is on disk. A stop request
/// or any failure leaves nothing at `path`.
pub async fn stream_to_file(
    artifact: Artifact,
    path: &Path,
    stop: &StopSignal,
) -> Result<u64, StagingError> {
    let write_err = |source| StagingError::OutputWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".tatara-")
        .tempfile_in(dir)
        .map_err(write_err)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let Artifact { mut stream, size } = artifact;
    let written = tokio::select! {
        biased;
        () = stop.stopped() => return Err(StagingError::Cancelled),
        copied = tokio::io::copy(&mut stream, &mut file) => copied.map_err(write_err)?,
    };
    file.flush().await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);

    if written != size {
        return Err(StagingError::SizeMismatch {
            path: path.to_path_buf(),
            expected: size,
            actual: written,
        });
    }

    temp_path
        .persist(path)
        .map_err(|e| write_err(e.error))?;
    tracing::debug!(path = %path.display(), bytes = written, "artifact written");
    Ok(written)
}
