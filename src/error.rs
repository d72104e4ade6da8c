//! Error types for the matter store and its configuration.

use std::path::PathBuf;

/// Failures raised while loading or querying a [`MatterStore`](crate::store::MatterStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("source file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },

    #[error("query failed: {source}")]
    Query {
        query: String,
        #[source]
        source: QueryFault,
    },

    #[error("store is closed")]
    StoreClosed,

    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
}

impl StoreError {
    pub(crate) fn malformed(line: u64, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Why query text was refused or failed to run.
#[derive(Debug, thiserror::Error)]
pub enum QueryFault {
    #[error(transparent)]
    Engine(#[from] libsql::Error),

    #[error("query text is empty")]
    Empty,

    #[error("only read-only SELECT, WITH or VALUES statements are accepted, got {keyword}")]
    NotReadOnly { keyword: String },

    #[error("query text holds more than one statement")]
    MultipleStatements,

    #[error("statement left a transaction open; it was rolled back")]
    OpenTransaction,
}

/// Failures raised while resolving settings and environment overrides.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to parse settings file {}: {message}", path.display())]
    ParseFile { path: PathBuf, message: String },

    #[error("failed to read settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
