//! Container engine plumbing for tatara.
//!
//! Wraps the `docker` CLI behind the [`ImageEngine`] and [`DockerExecutor`]
//! traits, builds manifest layers and env overlays through [`ImageClient`],
//! and runs the buildpack lifecycle in a throwaway container with
//! [`DockerStager`].

pub mod client;
pub mod docker;
pub mod executor;
pub mod progress;
pub mod stager;

pub use client::{ENV_DIR, EnvOverlay, ImageClient, ImageError};
pub use docker::DockerError;
pub use executor::{DockerCli, DockerExecutor, ImageEngine};
pub use progress::{Progress, ProgressStream, Verbosity};
pub use stager::{Artifact, DockerStager, StageRequest, Stager, StagerError};
