//! `heroku.yml` discovery and parsing.
//!
//! The manifest is read fresh on every staging run. Its content id is a
//! digest of the raw file bytes rather than of the parsed structure, so any
//! edit (whitespace included) produces new derived image tags.

use std::collections::BTreeMap;
use std::path::Path;

use data_encoding::BASE32HEX;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Manifest file name, relative to the application directory.
pub const MANIFEST_FILE: &str = "heroku.yml";

/// The `build` section of `heroku.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildDirectives {
    /// Buildpack references, URLs or registry short names
    #[serde(default)]
    pub buildpacks: Vec<String>,
    /// OS packages installed into the derived stack images
    #[serde(default)]
    pub packages: Vec<String>,
    /// Commands run before package installation
    #[serde(default)]
    pub pre: Vec<String>,
    /// Commands run after package installation
    #[serde(default)]
    pub post: Vec<String>,
    /// Build-time settings passed to buildpacks
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ManifestFile {
    build: Option<BuildDirectives>,
}

/// A parsed `heroku.yml` plus the content id derived from its bytes.
///
/// # Examples
///
/// ```
/// use tatara_core::Manifest;
///
/// let manifest = Manifest::from_bytes(b"build:\n  packages: [curl]\n").unwrap();
/// assert_eq!(manifest.build.packages, vec!["curl"]);
/// assert!(manifest.build_image().ends_with(":build"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub build: BuildDirectives,
    pub content_id: String,
}

impl Manifest {
    /// Read `heroku.yml` from the application directory.
    ///
    /// Returns `Ok(None)` when the file does not exist; callers fall back to
    /// their own buildpacks and the unmodified stack images.
    ///
    /// # Errors
    ///
    /// - [`Error::ManifestRead`](crate::Error::ManifestRead) if the file exists but cannot be read
    /// - [`Error::ManifestParse`](crate::Error::ManifestParse) if it is not valid YAML of the expected shape
    pub fn read(app_dir: &Path) -> crate::Result<Option<Self>> {
        let path = app_dir.join(MANIFEST_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no manifest found");
                return Ok(None);
            }
            Err(e) => return Err(crate::Error::ManifestRead { path, source: e }),
        };

        let manifest = Self::from_bytes(&bytes)
            .map_err(|e| crate::Error::ManifestParse { path: path.clone(), source: e })?;

        tracing::debug!(
            path = %path.display(),
            id = %manifest.content_id,
            buildpacks = manifest.build.buildpacks.len(),
            packages = manifest.build.packages.len(),
            "manifest loaded"
        );
        Ok(Some(manifest))
    }

    /// Parse manifest bytes. An empty document yields empty directives.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
        let build = if bytes.iter().all(u8::is_ascii_whitespace) {
            BuildDirectives::default()
        } else {
            let file: Option<ManifestFile> = serde_yaml::from_slice(bytes)?;
            file.and_then(|f| f.build).unwrap_or_default()
        };

        Ok(Self {
            build,
            content_id: content_id(bytes),
        })
    }

    /// Buildpack references with short names expanded against `registry`.
    pub fn resolve_buildpacks(&self, registry: &str) -> Vec<String> {
        resolve_buildpacks(&self.build.buildpacks, registry)
    }

    /// Tag of the derived run-stack image.
    pub fn run_image(&self) -> String {
        format!("{}:run", self.content_id)
    }

    /// Tag of the derived build-stack image.
    pub fn build_image(&self) -> String {
        format!("{}:build", self.content_id)
    }
}

/// Digest of raw manifest bytes, safe to use as a file name and image
/// repository name.
pub fn content_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    BASE32HEX
        .encode(&digest)
        .to_ascii_lowercase()
        .replace('=', "x")
}

/// Expand a buildpack reference. URLs pass through unchanged.
pub fn resolve_buildpack(reference: &str, registry: &str) -> String {
    if reference.starts_with("https://") || reference.starts_with("http://") {
        reference.to_owned()
    } else {
        format!("{}/{reference}.tgz", registry.trim_end_matches('/'))
    }
}

pub fn resolve_buildpacks(references: &[String], registry: &str) -> Vec<String> {
    references
        .iter()
        .map(|r| resolve_buildpack(r, registry))
        .collect()
}
