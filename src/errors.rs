// errors.rs
use thiserror::Error;

use crate::barefoot::TransportError;

/// Errors originating from either the server logic
/// (routing, missing resources, etc.) or downstream layers (DB, SOAP).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not Found")]
    NotFound,
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Database Error: {0}")]
    DbError(String),
    #[error("Transport Error: {0}")]
    Transport(#[from] TransportError),
    #[error("Internal Server Error")]
    InternalError,
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::DbError(e.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::DbError(format!("JSON column error: {e}"))
    }
}
