//! Core types and configuration for tatara.
//!
//! This crate defines the `tatara.toml` schema ([`TataraConfig`]), the
//! `heroku.yml` manifest reader ([`Manifest`]), the cooperative stop signal
//! shared by every long-running step, and shared error types.

pub mod cancel;
pub mod config;
pub mod error;
pub mod manifest;

pub use cancel::{StopHandle, StopSignal, stop_channel};
pub use config::{BuildConfig, BuildpackConfig, StackConfig, StagerConfig, TataraConfig};
pub use error::{Error, Result};
pub use manifest::{BuildDirectives, MANIFEST_FILE, Manifest, resolve_buildpack, resolve_buildpacks};
