use thiserror::Error;

/// Failure of a single call to an external inference service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// The call did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection or transport failure before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered `503 Service Unavailable`.
    #[error("service unavailable")]
    Unavailable,

    /// Any other non-success status.
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response arrived but its payload is not what the contract says.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The request could not be built from local input (e.g. missing avatar
    /// image).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ServiceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ServiceError::Malformed(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else if e.is_decode() {
            ServiceError::Malformed(e.to_string())
        } else {
            ServiceError::Request(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Malformed(e.to_string())
    }
}
