//! Dockerfile synthesis, app archiving, and cache storage for tatara.
//!
//! # Staging inputs
//!
//! ```text
//! heroku.yml ── DockerfileGenerator::render() ── BuildContext ── <id>:run / <id>:build
//! app dir    ── archive_app()  (excludes <app>.slug, .<app>.cache) ── stager
//! .<app>.cache ── Cache::open() (empty on first build) ── stager
//! ```
//!
//! # Archive strategy
//!
//! Only regular files are archived, with names relative to the app root.
//! Exclusions match file names, not paths, so a stale slug or cache is left
//! out wherever it sits in the tree.

pub mod archive;
pub mod cache;
pub mod context;
pub mod dockerfile;

pub use archive::{AppArchive, ArchiveError, ExcludePatterns, archive_app, tar_directory};
pub use cache::{Cache, CacheError};
pub use context::{BuildContext, ContextError};
pub use dockerfile::DockerfileGenerator;
