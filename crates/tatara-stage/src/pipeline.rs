use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tatara_build::{Cache, DockerfileGenerator, ExcludePatterns, archive_app};
use tatara_core::{Manifest, StopSignal, TataraConfig};
use tatara_engine::{
    DockerCli, DockerStager, EnvOverlay, ImageClient, ImageEngine, StageRequest, Stager,
    Verbosity,
};

use crate::error::StagingError;
use crate::output::stream_to_file;

/// Inputs of one staging run.
#[derive(Debug, Clone)]
pub struct StagingRequest {
    pub app_dir: PathBuf,
    pub app_name: String,
    /// Directory receiving `<app>.<ext>` and `.<app>.cache`
    pub output_dir: PathBuf,
    /// Buildpack URLs, replaced by the manifest's when it declares any
    pub buildpacks: Vec<String>,
    /// Runtime overrides baked into an ephemeral overlay image
    pub env: BTreeMap<String, String>,
    pub skip_stack_pull: bool,
}

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ReadManifest,
    PullStacks,
    BuildRunLayer,
    BuildBuildLayer,
    BuildEnvOverlay,
    ArchiveApp,
    OpenCache,
    Stage,
    StreamOutput,
    Cleanup,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadManifest => "read manifest",
            Self::PullStacks => "pull stack images",
            Self::BuildRunLayer => "build run layer",
            Self::BuildBuildLayer => "build build layer",
            Self::BuildEnvOverlay => "build env overlay",
            Self::ArchiveApp => "archive app",
            Self::OpenCache => "open cache",
            Self::Stage => "stage",
            Self::StreamOutput => "write artifact",
            Self::Cleanup => "clean up",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of a successful staging run.
#[derive(Debug, Clone)]
pub struct StagingOutcome {
    pub artifact_path: PathBuf,
    pub cache_path: PathBuf,
    /// Image the stager ran in
    pub stack_image: String,
    /// Image the artifact is meant to run on
    pub run_image: String,
    /// Manifest layers built during the run
    pub layers: Vec<String>,
    /// Ephemeral overlay built (and removed) during the run
    pub overlay: Option<String>,
    pub steps: Vec<Step>,
}

/// Sequences manifest layers, env overlay, archiving, staging, and output.
pub struct Pipeline<E: ImageEngine = DockerCli, S: Stager = DockerStager> {
    images: ImageClient<E>,
    stager: S,
    config: TataraConfig,
    stop: StopSignal,
}

impl Pipeline<DockerCli, DockerStager> {
    pub fn new(config: TataraConfig, stop: StopSignal) -> Self {
        let stager = DockerStager::new(config.stager.builder.as_str());
        Self::with_parts(ImageClient::new(stop.clone()), stager, config, stop)
    }
}

impl<E: ImageEngine, S: Stager> Pipeline<E, S> {
    pub fn with_parts(
        images: ImageClient<E>,
        stager: S,
        config: TataraConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            images,
            stager,
            config,
            stop,
        }
    }

    pub fn stager(&self) -> &S {
        &self.stager
    }

    /// Stage `request.app_dir` into `<output_dir>/<app>.<ext>`.
    ///
    /// The manifest is read before any image work, so a malformed
    /// `heroku.yml` fails fast. Manifest layers are kept for reuse; the env
    /// overlay is removed whether or not staging succeeds.
    pub async fn stage(&self, request: &StagingRequest) -> Result<StagingOutcome, StagingError> {
        let mut steps = Vec::new();

        enter(Step::ReadManifest);
        let manifest = Manifest::read(&request.app_dir)?;
        steps.push(Step::ReadManifest);

        let mut stack = self.config.stack.build_image();
        let mut run_image = self.config.stack.run_image();
        let mut buildpacks = request.buildpacks.clone();
        let mut layers = Vec::new();

        if !request.skip_stack_pull {
            enter(Step::PullStacks);
            self.images.pull(&stack).await?;
            if manifest.is_some() {
                self.images.pull(&run_image).await?;
            }
            steps.push(Step::PullStacks);
        }

        let mut staging_env = BTreeMap::new();
        if let Some(manifest) = &manifest {
            if !manifest.build.buildpacks.is_empty() {
                buildpacks = manifest.resolve_buildpacks(&self.config.buildpacks.registry);
            }

            enter(Step::BuildRunLayer);
            run_image = self
                .build_layer(&run_image, manifest.run_image(), manifest)
                .await?;
            layers.push(run_image.clone());
            steps.push(Step::BuildRunLayer);

            enter(Step::BuildBuildLayer);
            stack = self
                .build_layer(&stack, manifest.build_image(), manifest)
                .await?;
            layers.push(stack.clone());
            steps.push(Step::BuildBuildLayer);

            staging_env.extend(manifest.build.config.clone());
        }
        staging_env.insert("STACK".to_owned(), self.config.stack.name.clone());

        let overlay = if request.env.is_empty() {
            None
        } else {
            enter(Step::BuildEnvOverlay);
            let overlay = self
                .images
                .build_env_overlay(&stack, &request.app_name, &request.env)
                .await?;
            steps.push(Step::BuildEnvOverlay);
            stack = overlay.image.clone();
            Some(overlay)
        };

        let staged = self
            .stage_app(request, &stack, &buildpacks, &staging_env, &mut steps)
            .await;

        if let Some(overlay) = &overlay {
            enter(Step::Cleanup);
            self.remove_overlay(overlay).await;
            steps.push(Step::Cleanup);
        }

        let (artifact_path, cache_path) = staged?;
        steps.push(Step::Done);
        tracing::info!(artifact = %artifact_path.display(), "staging complete");

        Ok(StagingOutcome {
            artifact_path,
            cache_path,
            stack_image: stack,
            run_image,
            layers,
            overlay: overlay.map(|o| o.image),
            steps,
        })
    }

    async fn build_layer(
        &self,
        base: &str,
        tag: String,
        manifest: &Manifest,
    ) -> Result<String, StagingError> {
        let dockerfile = DockerfileGenerator::new(base, &manifest.build)
            .with_post_commands(self.config.build.support_post_commands)
            .render();
        tracing::debug!(%base, %tag, "manifest layer recipe:\n{dockerfile}");
        self.images
            .build_recipe(&tag, &dockerfile, Verbosity::Verbose)
            .await?;
        Ok(tag)
    }

    /// Archive, stage, and write the artifact. Returns the artifact and cache
    /// paths.
    async fn stage_app(
        &self,
        request: &StagingRequest,
        stack: &str,
        buildpacks: &[String],
        env: &BTreeMap<String, String>,
        steps: &mut Vec<Step>,
    ) -> Result<(PathBuf, PathBuf), StagingError> {
        let extension = &self.config.build.artifact_extension;

        self.check_stop()?;
        enter(Step::ArchiveApp);
        let excludes = ExcludePatterns::for_app(&request.app_name, extension)?;
        let mut app_tar = archive_app(&request.app_dir, &excludes)?;
        steps.push(Step::ArchiveApp);

        enter(Step::OpenCache);
        let cache_path = request.output_dir.join(Cache::file_name(&request.app_name));
        let mut cache = Cache::open(&cache_path)?;
        let cache_empty = cache.is_empty();
        steps.push(Step::OpenCache);

        self.check_stop()?;
        enter(Step::Stage);
        let artifact = self
            .stager
            .stage(StageRequest {
                app_name: &request.app_name,
                app_tar: &mut app_tar,
                cache: &mut cache,
                cache_empty,
                stack,
                buildpacks,
                env,
                output_path: &self.config.stager.output_path,
            })
            .await?;
        steps.push(Step::Stage);

        enter(Step::StreamOutput);
        let artifact_path = artifact_path(&request.output_dir, &request.app_name, extension);
        stream_to_file(artifact, &artifact_path, &self.stop).await?;
        steps.push(Step::StreamOutput);

        Ok((artifact_path, cache_path))
    }

    /// Fails with `Cancelled` once a stop has been requested.
    fn check_stop(&self) -> Result<(), StagingError> {
        if self.stop.is_stopped() {
            return Err(StagingError::Cancelled);
        }
        Ok(())
    }

    async fn remove_overlay(&self, overlay: &EnvOverlay) {
        if let Err(e) = self.images.remove(&overlay.image).await {
            tracing::warn!(image = %overlay.image, error = %e, "failed to remove env overlay image");
        }
    }
}

/// Path of the staged artifact, e.g. `./myapp.slug`.
pub fn artifact_path(output_dir: &Path, app_name: &str, extension: &str) -> PathBuf {
    output_dir.join(format!("{app_name}.{extension}"))
}

fn enter(step: Step) {
    tracing::info!(%step, "staging");
}
