//! Error types for keylock
//!
//! Contention and misuse (`denied`, `locked`, `not_yours`, `not_locked`) are
//! reply values, not errors. Everything here means the service itself could
//! not answer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Authority Errors ===
    #[error("Authority unavailable: {0}")]
    AuthorityUnavailable(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    // === Serialization ===
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::AuthorityUnavailable("request channel closed".into())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::AuthorityUnavailable("authority dropped the reply".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_channels_map_to_unavailable() {
        let err = Error::from(tokio::sync::mpsc::error::SendError(1u8));
        assert!(matches!(err, Error::AuthorityUnavailable(_)));

        let (tx, rx) = tokio::sync::oneshot::channel::<u8>();
        drop(tx);
        let recv_err = rx.blocking_recv().unwrap_err();
        assert!(matches!(Error::from(recv_err), Error::AuthorityUnavailable(_)));
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidConfig("shards must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: shards must be at least 1"
        );
    }
}
