use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used to decide whether an error aborts the run or
/// is folded into the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    Acquisition,
    Connection,
    ScriptExecution,
    Other,
}

#[derive(Debug, Error)]
pub enum FrkError {
    #[error("invalid local file '{}': {reason}", path.display())]
    InvalidLocalFile { path: PathBuf, reason: String },

    #[error("invalid instance '{0}': expected host, host\\instance or host,port")]
    InvalidInstance(String),

    #[error("unknown channel '{0}': expected 'stable' or 'development'")]
    InvalidChannel(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("unpack failed: {0}")]
    Unpack(String),

    #[error(
        "could not acquire the {channel} release: {message}\n  \
         download it manually from {manual_url} and re-run with --local-file <path>"
    )]
    Acquisition {
        channel: String,
        message: String,
        manual_url: String,
    },

    #[error("connection to {instance} failed: {message}")]
    Connection { instance: String, message: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("script {script} failed: {message}")]
    Script { script: String, message: String },

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FrkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrkError::InvalidLocalFile { .. }
            | FrkError::InvalidInstance(_)
            | FrkError::InvalidChannel(_) => ErrorKind::InputValidation,
            FrkError::Fetch(_) | FrkError::Unpack(_) | FrkError::Acquisition { .. } => {
                ErrorKind::Acquisition
            }
            FrkError::Connection { .. } | FrkError::Query(_) => ErrorKind::Connection,
            FrkError::Script { .. } => ErrorKind::ScriptExecution,
            FrkError::HomeNotFound | FrkError::Io(_) | FrkError::Yaml(_) | FrkError::Json(_) => {
                ErrorKind::Other
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, FrkError>;
