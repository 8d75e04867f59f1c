use std::collections::BTreeMap;
use std::path::PathBuf;

use tatara_build::{ArchiveError, BuildContext, ContextError};
use tatara_core::StopSignal;
use tokio_stream::StreamExt;

use crate::docker::DockerError;
use crate::executor::{DockerCli, ImageEngine};
use crate::progress::{Progress, ProgressStream, Verbosity};

/// Container path the env overlay copies variable files into.
pub const ENV_DIR: &str = "/tmp/env";

/// Image operations used by staging, parameterized over the engine for
/// testability.
pub struct ImageClient<E: ImageEngine = DockerCli> {
    engine: E,
    stop: StopSignal,
}

impl ImageClient<DockerCli> {
    pub fn new(stop: StopSignal) -> Self {
        Self {
            engine: DockerCli::new(),
            stop,
        }
    }
}

/// An image built to carry ephemeral runtime overrides.
///
/// It is not meant to outlive the run that created it: callers remove it
/// with [`ImageClient::remove`] once staging finishes, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "env overlay images must be removed after the run"]
pub struct EnvOverlay {
    pub image: String,
}

impl<E: ImageEngine> ImageClient<E> {
    pub fn with_engine(engine: E, stop: StopSignal) -> Self {
        Self { engine, stop }
    }

    // ── Pull ──

    pub async fn pull(&self, image: &str) -> Result<(), ImageError> {
        tracing::info!(%image, "pulling image");
        let stream = self
            .engine
            .pull(image)
            .await
            .map_err(|e| ImageError::Pull {
                image: image.to_owned(),
                message: e.to_string(),
            })?;

        match self.drain(stream, Verbosity::Quiet).await {
            Ok(()) => Ok(()),
            Err(Drain::Cancelled) => Err(ImageError::Cancelled),
            Err(Drain::Failed(message)) => Err(ImageError::Pull {
                image: image.to_owned(),
                message,
            }),
        }
    }

    // ── Layer builds ──

    /// Build a single-file context holding `dockerfile` and tag the result.
    pub async fn build_recipe(
        &self,
        tag: &str,
        dockerfile: &str,
        verbosity: Verbosity,
    ) -> Result<(), ImageError> {
        let context = BuildContext::new(dockerfile).into_tar()?;
        self.build_context(tag, context, verbosity).await
    }

    /// Submit a tar build context and drain its progress to completion or
    /// first error. Layers the engine already created are left in place.
    pub async fn build_context(
        &self,
        tag: &str,
        context: Vec<u8>,
        verbosity: Verbosity,
    ) -> Result<(), ImageError> {
        tracing::info!(%tag, bytes = context.len(), "building image");
        let stream = self
            .engine
            .build(context, tag)
            .await
            .map_err(|e| ImageError::Build {
                tag: tag.to_owned(),
                message: e.to_string(),
            })?;

        match self.drain(stream, verbosity).await {
            Ok(()) => Ok(()),
            Err(Drain::Cancelled) => Err(ImageError::Cancelled),
            Err(Drain::Failed(message)) => Err(ImageError::Build {
                tag: tag.to_owned(),
                message,
            }),
        }
    }

    // ── Env overlay ──

    /// Derive `target` from `base` with each variable stored as a file
    /// under [`ENV_DIR`], without touching manifest-driven layers.
    pub async fn build_env_overlay(
        &self,
        base: &str,
        target: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<EnvOverlay, ImageError> {
        if variables.is_empty() {
            return Err(ImageError::EmptyOverlay);
        }
        for name in variables.keys() {
            validate_env_name(name)?;
        }

        let scratch = tempfile::tempdir().map_err(|e| ImageError::Scratch {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let env_dir = scratch.path().join("env");
        std::fs::create_dir(&env_dir).map_err(|e| ImageError::Scratch {
            path: env_dir.clone(),
            source: e,
        })?;
        for (name, value) in variables {
            let path = env_dir.join(name);
            std::fs::write(&path, value.as_bytes())
                .map_err(|e| ImageError::Scratch { path, source: e })?;
        }

        let dockerfile_path = scratch.path().join(tatara_build::context::DOCKERFILE);
        std::fs::write(&dockerfile_path, overlay_dockerfile(base)).map_err(|e| {
            ImageError::Scratch {
                path: dockerfile_path.clone(),
                source: e,
            }
        })?;

        let context = tatara_build::tar_directory(scratch.path())?;
        tracing::debug!(%base, %target, variables = variables.len(), "building env overlay");
        self.build_context(target, context, Verbosity::Quiet).await?;

        Ok(EnvOverlay {
            image: target.to_owned(),
        })
    }

    // ── Remove ──

    pub async fn remove(&self, image: &str) -> Result<(), ImageError> {
        tracing::debug!(%image, "removing image");
        self.engine
            .remove(image)
            .await
            .map_err(|e| ImageError::Remove {
                image: image.to_owned(),
                source: e,
            })
    }

    /// Consume a progress stream until it ends, errors, or a stop is requested.
    ///
    /// On a stop the stream is dropped rather than drained; dropping it kills
    /// the engine process (`kill_on_drop`).
    async fn drain(&self, mut stream: ProgressStream, verbosity: Verbosity) -> Result<(), Drain> {
        loop {
            let item = tokio::select! {
                biased;
                () = self.stop.stopped() => return Err(Drain::Cancelled),
                item = stream.next() => item,
            };
            match item {
                None => return Ok(()),
                Some(Ok(Progress::Error(message))) => return Err(Drain::Failed(message)),
                Some(Ok(progress)) => match verbosity {
                    Verbosity::Verbose => println!("{progress}"),
                    Verbosity::Quiet => tracing::trace!(%progress),
                },
                Some(Err(e)) => return Err(Drain::Failed(e.to_string())),
            }
        }
    }
}

enum Drain {
    Cancelled,
    Failed(String),
}

fn overlay_dockerfile(base: &str) -> String {
    format!("FROM {base}\nCOPY env {ENV_DIR}\n")
}

/// Variable names become file names, so they must be single path components.
fn validate_env_name(name: &str) -> Result<(), ImageError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative directory reference")
    } else if name.contains('/') || name.contains('\\') {
        Some("name contains a path separator")
    } else if name.contains('\0') {
        Some("name contains a NUL byte")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ImageError::InvalidEnvVar {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to pull image {image}: {message}")]
    Pull { image: String, message: String },

    #[error("failed to build image {tag}: {message}")]
    Build { tag: String, message: String },

    #[error("failed to remove image {image}")]
    Remove { image: String, source: DockerError },

    #[error("invalid environment variable name {name:?}: {reason}")]
    InvalidEnvVar { name: String, reason: &'static str },

    #[error("env overlay requested without any variables")]
    EmptyOverlay,

    #[error("failed to prepare env overlay files at {path}")]
    Scratch {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("image operation cancelled")]
    Cancelled,
}
