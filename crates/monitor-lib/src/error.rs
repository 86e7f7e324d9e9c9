//! Error types for the sampling engine

use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

/// Failure of a single fetch from the device data source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what} from {input:?}")]
    Parse { what: &'static str, input: String },

    #[error("{0} is not available on this device")]
    Unavailable(&'static str),

    #[error("device command failed: {0}")]
    Command(String),

    #[error("{metric} fetch panicked: {message}")]
    Panicked {
        metric: &'static str,
        message: String,
    },
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(what: &'static str, input: impl Into<String>) -> Self {
        Self::Parse {
            what,
            input: input.into(),
        }
    }

    pub(crate) fn panicked(metric: &'static str, err: JoinError) -> Self {
        Self::Panicked {
            metric,
            message: join_error_message(err),
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// A fault that prevented a whole tick from being assembled
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("{stage} fetch aborted: {message}")]
    FetchAborted {
        stage: &'static str,
        message: String,
    },
}

impl SamplerError {
    pub(crate) fn aborted(stage: &'static str, err: JoinError) -> Self {
        Self::FetchAborted {
            stage,
            message: join_error_message(err),
        }
    }
}

/// Panic payload text, or the join error itself when the task was cancelled
fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string())
    } else {
        err.to_string()
    }
}
