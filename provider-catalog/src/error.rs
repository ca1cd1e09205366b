//! Error types for the REST catalog connector

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Catalog connector errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The API key was rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error status
    #[error("Catalog API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Album does not exist
    #[error("Album not found: {album_id}")]
    AlbumNotFound { album_id: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for catalog connector operations
pub type Result<T> = std::result::Result<T, CatalogError>;

impl From<CatalogError> for BridgeError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::AlbumNotFound { album_id } => {
                BridgeError::NotFound(format!("album {}", album_id))
            }
            CatalogError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
