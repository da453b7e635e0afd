use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which durable artifact a persistence failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Checkpoint,
    Output,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Checkpoint => f.write_str("checkpoint"),
            Artifact::Output => f.write_str("output dataset"),
        }
    }
}

/// Infrastructure failures of the batch engine.
///
/// A single item failing is not an error: it is recorded as
/// [`ItemOutcome::Failure`](crate::item::ItemOutcome) and the run continues.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("corrupt state in {}: {reason}", .path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("failed to persist {artifact} to {}", .path.display())]
    Persistence {
        artifact: Artifact,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start worker thread")]
    WorkerSpawn(#[source] std::io::Error),
}

impl BatchError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        BatchError::CorruptState {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn persistence(
        artifact: Artifact,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        BatchError::Persistence {
            artifact,
            path: path.into(),
            source,
        }
    }
}
