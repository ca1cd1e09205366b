use bridge_traits::error::BridgeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveAlbumError {
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Malformed live album metadata: {0}")]
    MalformedMetadata(String),

    #[error("Collection description does not carry live album metadata")]
    NotLive,

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Failed to fetch contents of collection {collection_id}: {message}")]
    FetchCurrentFailed {
        collection_id: String,
        message: String,
    },

    #[error("{failed} asset(s) failed to {operation}")]
    PartialApplyFailure {
        operation: &'static str,
        failed: usize,
    },

    #[error("Failed to persist definitions: {0}")]
    PersistenceFailed(String),

    #[error("Destination collection could not be resolved for definition '{0}'")]
    DestinationUnresolved(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] BridgeError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Catalog call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A run aborted and its failure could not be recorded either
    #[error("{error} (run not recorded: {persist_error})")]
    RunNotRecorded {
        error: Box<LiveAlbumError>,
        persist_error: String,
    },
}

impl LiveAlbumError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LiveAlbumError::InvalidDefinition(_) => ErrorKind::InvalidDefinition,
            LiveAlbumError::NotFound { .. } => ErrorKind::NotFound,
            LiveAlbumError::MalformedMetadata(_) => ErrorKind::MalformedMetadata,
            LiveAlbumError::NotLive => ErrorKind::NotLive,
            LiveAlbumError::SearchFailed(_) => ErrorKind::SearchFailed,
            LiveAlbumError::FetchCurrentFailed { .. } => ErrorKind::FetchCurrentFailed,
            LiveAlbumError::PartialApplyFailure { .. } => ErrorKind::PartialApplyFailure,
            LiveAlbumError::PersistenceFailed(_) => ErrorKind::PersistenceFailed,
            LiveAlbumError::DestinationUnresolved(_) => ErrorKind::DestinationUnresolved,
            LiveAlbumError::Catalog(_) => ErrorKind::Catalog,
            LiveAlbumError::Cancelled => ErrorKind::Cancelled,
            LiveAlbumError::Timeout(_) => ErrorKind::Timeout,
            LiveAlbumError::Config(_) => ErrorKind::Config,
            LiveAlbumError::RunNotRecorded { error, .. } => error.kind(),
        }
    }

    /// Why the run's bookkeeping write failed, if it did
    pub fn persist_error(&self) -> Option<&str> {
        match self {
            LiveAlbumError::RunNotRecorded { persist_error, .. } => Some(persist_error),
            _ => None,
        }
    }
}

impl From<core_runtime::Error> for LiveAlbumError {
    fn from(err: core_runtime::Error) -> Self {
        LiveAlbumError::Config(err.to_string())
    }
}

/// Copyable discriminant of [`LiveAlbumError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidDefinition,
    NotFound,
    MalformedMetadata,
    NotLive,
    SearchFailed,
    FetchCurrentFailed,
    PartialApplyFailure,
    PersistenceFailed,
    DestinationUnresolved,
    Catalog,
    Cancelled,
    Timeout,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidDefinition => "invalid_definition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::MalformedMetadata => "malformed_metadata",
            ErrorKind::NotLive => "not_live",
            ErrorKind::SearchFailed => "search_failed",
            ErrorKind::FetchCurrentFailed => "fetch_current_failed",
            ErrorKind::PartialApplyFailure => "partial_apply_failure",
            ErrorKind::PersistenceFailed => "persistence_failed",
            ErrorKind::DestinationUnresolved => "destination_unresolved",
            ErrorKind::Catalog => "catalog",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, LiveAlbumError>;
