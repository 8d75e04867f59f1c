mod build;
mod export;
mod signal;

pub use build::{BuildArgs, build, parse_env_pair};
pub use export::{ExportArgs, export};
pub(crate) use signal::stop_on_signal;
