use std::collections::VecDeque;
use std::fs::File;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

use crate::docker::{self, DockerError, STDERR_TAIL, args};
use crate::progress::{Progress, ProgressStream};

/// Abstraction over the container image store for testability.
///
/// Production code uses [`DockerCli`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait ImageEngine: Send + Sync {
    /// Start pulling an image. The pull runs while the stream is polled.
    async fn pull(&self, image: &str) -> Result<ProgressStream, DockerError>;

    /// Start building a tar build context, tagging the result.
    async fn build(&self, context: Vec<u8>, tag: &str) -> Result<ProgressStream, DockerError>;

    /// Remove an image, forcing removal of its tags.
    async fn remove(&self, image: &str) -> Result<(), DockerError>;
}

/// Raw docker CLI invocations, abstracted for testability.
///
/// Production code uses [`DockerCli`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait DockerExecutor: Send + Sync {
    /// Run a docker command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<Vec<u8>, DockerError>;

    /// Run a docker command with `stdin` attached, streaming its output to
    /// the terminal.
    async fn exec_streaming(&self, args: &[String], stdin: File) -> Result<(), DockerError>;
}

/// Image engine backed by the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Use a different docker-compatible CLI, e.g. `podman`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Spawn a docker command and expose its output lines as progress.
    ///
    /// A non-zero exit becomes a final [`Progress::Error`] carrying the tail
    /// of stderr. The child is killed if the stream is dropped early.
    fn spawn_progress(
        &self,
        args: Vec<String>,
        stdin: Option<Vec<u8>>,
        parse: fn(&str) -> Progress,
    ) -> Result<ProgressStream, DockerError> {
        tracing::debug!(program = %self.program, ?args, "spawning");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DockerError::NotFound { source: e })?;

        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            tokio::spawn(async move {
                let written: std::io::Result<()> = async {
                    pipe.write_all(&data).await?;
                    pipe.shutdown().await
                }
                .await;
                if let Err(e) = written {
                    tracing::debug!(error = %e, "docker closed stdin before the context was sent");
                }
            });
        }

        let stdout = child.stdout.take().ok_or_else(|| DockerError::Output {
            source: std::io::Error::other("docker stdout was not captured"),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| DockerError::Output {
            source: std::io::Error::other("docker stderr was not captured"),
        })?;

        let stream = async_stream::stream! {
            let out = LinesStream::new(BufReader::new(stdout).lines()).map(|line| (false, line));
            let err = LinesStream::new(BufReader::new(stderr).lines()).map(|line| (true, line));
            let mut lines = out.merge(err);
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);

            while let Some((from_stderr, line)) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(DockerError::Output { source: e });
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                if from_stderr {
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                }
                yield Ok(parse(&line));
            }

            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let message = if tail.is_empty() {
                        format!("{args:?} failed with exit code: {status}")
                    } else {
                        Vec::from(tail).join("\n")
                    };
                    yield Ok(Progress::Error(message));
                }
                Err(e) => yield Err(DockerError::Output { source: e }),
            }
        };

        Ok(Box::pin(stream))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerExecutor for DockerCli {
    async fn exec(&self, args: &[String]) -> Result<Vec<u8>, DockerError> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DockerError::NotFound { source: e })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    async fn exec_streaming(&self, args: &[String], stdin: File) -> Result<(), DockerError> {
        let status = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| DockerError::NotFound { source: e })?;

        if status.success() {
            Ok(())
        } else {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: format!("exit code: {status}"),
            })
        }
    }
}

impl ImageEngine for DockerCli {
    async fn pull(&self, image: &str) -> Result<ProgressStream, DockerError> {
        self.spawn_progress(args(["pull", image]), None, docker::parse_pull_line)
    }

    async fn build(&self, context: Vec<u8>, tag: &str) -> Result<ProgressStream, DockerError> {
        self.spawn_progress(
            args(["build", "--tag", tag, "-"]),
            Some(context),
            build_line,
        )
    }

    async fn remove(&self, image: &str) -> Result<(), DockerError> {
        self.exec(&args(["rmi", "--force", image])).await?;
        Ok(())
    }
}

fn build_line(line: &str) -> Progress {
    Progress::Stream(line.to_owned())
}
