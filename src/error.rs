use std::path::PathBuf;

/// Errors surfaced by the canvas engine and its persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("version {version} not found for project {project}")]
    VersionNotFound { project: String, version: u64 },

    #[error("invalid project: {0}")]
    InvalidProject(String),

    #[error("local storage unavailable: {0}")]
    Storage(String),

    #[error("no platform config directory available")]
    NoConfigDir,

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
