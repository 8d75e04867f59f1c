use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── heroku.yml ──
    #[error("failed to read manifest at {path}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}
