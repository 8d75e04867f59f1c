use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};

use tatara_build::{AppArchive, Cache};
use tokio::io::AsyncRead;

use crate::docker::{DockerError, args};
use crate::executor::{DockerCli, DockerExecutor};

/// Where the docker stager unpacks the application inside the container.
pub const APP_DIR: &str = "/tmp/app";
/// Where the docker stager keeps the build cache inside the container.
pub const CACHE_DIR: &str = "/tmp/cache";

/// Everything a stager needs for one run.
pub struct StageRequest<'a> {
    pub app_name: &'a str,
    /// Tar of the application tree, positioned at its start
    pub app_tar: &'a mut AppArchive,
    pub cache: &'a mut Cache,
    /// Skip cache restore on a first build
    pub cache_empty: bool,
    /// Image buildpacks run in
    pub stack: &'a str,
    pub buildpacks: &'a [String],
    /// Staging environment (`STACK` plus manifest settings)
    pub env: &'a BTreeMap<String, String>,
    /// Artifact path inside the staging container
    pub output_path: &'a str,
}

/// The staged artifact: its bytes and logical size.
pub struct Artifact {
    pub stream: Box<dyn AsyncRead + Send + Unpin>,
    pub size: u64,
}

/// Runs the buildpack lifecycle. Implementations own the cache contents.
#[allow(async_fn_in_trait)]
pub trait Stager: Send + Sync {
    async fn stage(&self, request: StageRequest<'_>) -> Result<Artifact, StagerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StagerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error("staging i/o failed: {context}")]
    Io {
        context: &'static str,
        source: std::io::Error,
    },

    #[error("staging produced no artifact at {path}")]
    MissingArtifact { path: String },
}

/// Unpacks the app from stdin, then hands over to the builder.
const ENTRYPOINT_SCRIPT: &str = r#"mkdir -p "$APP_DIR" "$CACHE_DIR" "$(dirname "$OUTPUT_PATH")" && tar -xf - -C "$APP_DIR" && exec "$@""#;

/// Stager that runs the stack image's builder in a throwaway container.
///
/// The builder receives its inputs as environment variables: `BUILDPACKS`
/// (comma separated), `CACHE_EMPTY`, `OUTPUT_PATH`, `APP_DIR`, `CACHE_DIR`,
/// plus the staging environment.
pub struct DockerStager<X: DockerExecutor = DockerCli> {
    docker: X,
    builder: String,
}

impl DockerStager<DockerCli> {
    pub fn new(builder: impl Into<String>) -> Self {
        Self::with_executor(DockerCli::new(), builder)
    }
}

impl<X: DockerExecutor> DockerStager<X> {
    pub fn with_executor(docker: X, builder: impl Into<String>) -> Self {
        Self {
            docker,
            builder: builder.into(),
        }
    }

    async fn run(&self, container: &str, request: StageRequest<'_>) -> Result<Artifact, StagerError> {
        if !request.cache_empty {
            let cache = request
                .cache
                .file()
                .try_clone()
                .map_err(|e| io("failed to reopen cache", e))?;
            self.docker
                .exec_streaming(&args(["cp", "-", &format!("{container}:/tmp")]), cache)
                .await?;
        }

        let app = request
            .app_tar
            .file()
            .try_clone()
            .map_err(|e| io("failed to reopen app archive", e))?;
        self.docker
            .exec_streaming(&args(["start", "--attach", "--interactive", container]), app)
            .await?;

        let cache_tar = self
            .docker
            .exec(&args(["cp", &format!("{container}:{CACHE_DIR}"), "-"]))
            .await?;

        let artifact_tar = self
            .docker
            .exec(&args([
                "cp",
                &format!("{container}:{}", request.output_path),
                "-",
            ]))
            .await?;
        let (file, size) = extract_artifact(&artifact_tar, request.output_path)?;

        // The cache only advances once the run produced an artifact.
        replace_cache(request.cache, &cache_tar)?;

        Ok(Artifact {
            stream: Box::new(tokio::fs::File::from_std(file)),
            size,
        })
    }
}

impl<X: DockerExecutor> Stager for DockerStager<X> {
    async fn stage(&self, request: StageRequest<'_>) -> Result<Artifact, StagerError> {
        let container = format!("tatara-{}-{}", request.app_name, std::process::id());

        let mut create = args(["create", "--name", &container, "--interactive"]);
        for (name, value) in contract_env(&request) {
            create.push("--env".to_owned());
            create.push(format!("{name}={value}"));
        }
        create.extend(args([
            request.stack,
            "/bin/sh",
            "-c",
            ENTRYPOINT_SCRIPT,
            "tatara-stage",
            &self.builder,
        ]));

        tracing::debug!(%container, stack = %request.stack, "creating staging container");
        self.docker.exec(&create).await?;

        let result = self.run(&container, request).await;

        if let Err(e) = self.docker.exec(&args(["rm", "--force", &container])).await {
            tracing::warn!(%container, error = %e, "failed to remove staging container");
        }
        result
    }
}

fn contract_env(request: &StageRequest<'_>) -> BTreeMap<String, String> {
    let mut env = request.env.clone();
    env.insert("BUILDPACKS".to_owned(), request.buildpacks.join(","));
    env.insert("CACHE_EMPTY".to_owned(), request.cache_empty.to_string());
    env.insert("OUTPUT_PATH".to_owned(), request.output_path.to_owned());
    env.insert("APP_DIR".to_owned(), APP_DIR.to_owned());
    env.insert("CACHE_DIR".to_owned(), CACHE_DIR.to_owned());
    env
}

fn replace_cache(cache: &mut Cache, contents: &[u8]) -> Result<(), StagerError> {
    let file = cache.file_mut();
    file.set_len(0)
        .map_err(|e| io("failed to truncate cache", e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| io("failed to rewind cache", e))?;
    file.write_all(contents)
        .map_err(|e| io("failed to write cache", e))?;
    file.flush().map_err(|e| io("failed to write cache", e))
}

/// Pull the single regular file out of a `docker cp` tar stream.
fn extract_artifact(tar_bytes: &[u8], path: &str) -> Result<(std::fs::File, u64), StagerError> {
    let mut archive = tar::Archive::new(tar_bytes);
    let entries = archive
        .entries()
        .map_err(|e| io("failed to read artifact archive", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| io("failed to read artifact archive", e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let mut file = tempfile::tempfile().map_err(|e| io("failed to spool artifact", e))?;
        let size = std::io::copy(&mut entry, &mut file)
            .map_err(|e| io("failed to spool artifact", e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| io("failed to spool artifact", e))?;
        return Ok((file, size));
    }

    Err(StagerError::MissingArtifact {
        path: path.to_owned(),
    })
}

fn io(context: &'static str, source: std::io::Error) -> StagerError {
    StagerError::Io { context, source }
}
