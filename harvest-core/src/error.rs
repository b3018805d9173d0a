//! Error types for harvest-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::DocId;

/// Errors raised by record and content stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A journal or content file could not be decoded.
    #[error("corrupt store entry in {path} (line {line}): {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error on the write path.
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A status-only update named an identifier the store has never seen.
    #[error("no record for id {0}")]
    MissingRecord(DocId),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No config file at the expected location.
    #[error("config not found at {path}; run `harvest init` first")]
    NotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A field holds a value outside its allowed range.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors reported by a remote corpus collaborator.
///
/// `Status` and `Transport` are transient and retried by the caller;
/// `Malformed` is a data error and is never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote answered with a non-success status.
    #[error("ErrCode:{code} reason:{reason} url:{target}")]
    Status {
        code: u16,
        reason: String,
        target: String,
    },

    /// The request never produced a response (DNS, refused, timeout, reset).
    #[error("transport error for {target}: {message}")]
    Transport { target: String, message: String },

    /// The response arrived but could not be decoded.
    #[error("malformed response from {target}: {message}")]
    Malformed { target: String, message: String },
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Status { .. } | RemoteError::Transport { .. })
    }

    /// The request target the error refers to.
    pub fn target(&self) -> &str {
        match self {
            RemoteError::Status { target, .. }
            | RemoteError::Transport { target, .. }
            | RemoteError::Malformed { target, .. } => target,
        }
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
