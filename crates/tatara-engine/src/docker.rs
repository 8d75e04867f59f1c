use crate::progress::Progress;

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker CLI not found, install it from https://docs.docker.com/get-docker/")]
    NotFound { source: std::io::Error },

    #[error("docker command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("failed to read docker output")]
    Output { source: std::io::Error },
}

/// Lines of stderr kept for the error message of a failed command.
pub(crate) const STDERR_TAIL: usize = 20;

/// Parse a `docker pull` output line into a status message.
///
/// Layer lines look like `a3ed95caeb02: Pull complete`; everything else
/// (`Digest: sha256:...` included) is treated as a plain status.
pub(crate) fn parse_pull_line(line: &str) -> Progress {
    match line.split_once(": ") {
        Some((id, status)) if is_layer_id(id) => Progress::Status {
            id: Some(id.to_owned()),
            status: status.to_owned(),
        },
        _ => Progress::Status {
            id: None,
            status: line.to_owned(),
        },
    }
}

fn is_layer_id(id: &str) -> bool {
    id.len() == 12 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

pub(crate) fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}
