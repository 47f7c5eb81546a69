use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort an invocation before or outside dispatch.
///
/// Per-request dispatch failures are not represented here; they are
/// captured as [`crate::dispatch::Failure`] values on the completion so
/// one bad request never aborts its siblings.
#[derive(Debug, Error)]
pub enum GaleError {
    #[error("row {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("unknown prompt template: {0}")]
    UnknownPrompt(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: invalid JSON: {source}", path.display())]
    JsonLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}:{line}: expected a JSON object, got {found}", path.display())]
    NotAnObject {
        path: PathBuf,
        line: usize,
        found: &'static str,
    },
}

impl GaleError {
    /// Wrap an io::Error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
