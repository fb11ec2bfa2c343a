use thiserror::Error;

/// Failure of a single remote call. The cascade treats every variant as
/// "this candidate did not work" and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("SOAP fault: {0}")]
    ProtocolFault(String),
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else {
            TransportError::ConnectionFailed(e.to_string())
        }
    }
}
