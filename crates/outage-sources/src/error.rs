use strum::Display;
use thiserror::Error;

/// Failure class of a source error, used by pollers to pick an escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    Transient,
    DataShape,
    Auth,
    Other,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// Network failure, timeout or upstream 5xx.
    #[error("transient fetch error: {0}")]
    Transient(String),
    /// Payload is missing an expected field or group.
    #[error("unexpected payload: {0}")]
    DataShape(String),
    /// Provider rejected the configured credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("other: {0}")]
    Other(String),
}

impl SourceError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn data_shape(msg: impl Into<String>) -> Self {
        Self::DataShape(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Transient(_) => ErrorKind::Transient,
            SourceError::DataShape(_) => ErrorKind::DataShape,
            SourceError::Auth(_) => ErrorKind::Auth,
            SourceError::Other(_) => ErrorKind::Other,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return SourceError::Auth(err.to_string());
            }
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return SourceError::Transient(err.to_string());
            }
            return SourceError::Other(err.to_string());
        }

        if err.is_decode() {
            return SourceError::DataShape(err.to_string());
        }

        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return SourceError::Transient(err.to_string());
        }

        SourceError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::DataShape(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
