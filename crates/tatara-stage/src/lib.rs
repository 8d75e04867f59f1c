//! Staging orchestrator for tatara.
//!
//! [`Pipeline::stage`] turns an application directory into a slug and a
//! refreshed build cache:
//!
//! ```text
//! read heroku.yml → pull stacks → <id>:run → <id>:build → env overlay
//!   → archive app → open cache → stager → ./<app>.slug → remove overlay
//! ```
//!
//! Manifest layers are named after the manifest content id and kept for
//! reuse. The env overlay is ephemeral and removed on every exit path.

pub mod error;
pub mod output;
pub mod pipeline;

pub use error::StagingError;
pub use output::stream_to_file;
pub use pipeline::{Pipeline, StagingOutcome, StagingRequest, Step, artifact_path};
