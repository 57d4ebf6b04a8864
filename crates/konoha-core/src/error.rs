//! Error types for konoha-core

use thiserror::Error;

use crate::models::EventId;
use crate::remote::RemoteError;

/// Result type alias using konoha-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in konoha-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event, attendee, or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote document store error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The barcode detector could not be initialized
    #[error("Decoder unavailable: {0}")]
    DecodeUnavailable(String),

    /// A scan session is already running on this device
    #[error("A scan session is already active for event {0}")]
    SessionActive(EventId),

    /// The event was archived and no longer accepts check-ins
    #[error("Event {0} is archived")]
    EventArchived(EventId),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
