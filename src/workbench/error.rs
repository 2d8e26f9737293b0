use thiserror::Error;

use crate::database::DatabaseError;
use crate::platform::DirectoryError;

/// A DB-service descriptor that cannot be expressed as a workbench connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Unsupported database engine '{0}'")]
    UnsupportedEngine(String),

    #[error("{engine} connection requires parameter '{param}'")]
    MissingParameter { engine: String, param: &'static str },
}

#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error("Workbench integration is not configured")]
    NotConfigured,

    #[error("Workbench authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("Workbench unreachable: {0}")]
    Transport(String),

    #[error("Workbench call timed out")]
    Timeout,

    #[error("Workbench rejected the call: {0}")]
    Remote(String),

    #[error("Unexpected workbench response: {0}")]
    InvalidResponse(String),

    #[error("Workbench version {0} is older than any supported query set")]
    UnsupportedVersion(String),

    #[error("Connections of user {user} still differ after rebind (missing {missing:?}, unexpected {unexpected:?})")]
    DriftConvergence {
        user: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl WorkbenchError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, WorkbenchError::Authentication(_))
    }
}

impl From<reqwest::Error> for WorkbenchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WorkbenchError::Timeout
        } else if err.is_decode() {
            WorkbenchError::InvalidResponse(err.to_string())
        } else {
            WorkbenchError::Transport(err.to_string())
        }
    }
}
