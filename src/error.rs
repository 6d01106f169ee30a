use crate::logic::types::PairKey;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::Display;

/// Failure taxonomy surfaced in cycle reports.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The source rejects the (track, vehicle) combination. Permanent.
    InvalidEntity,
    /// Network failure or timeout. Retried on the next natural cycle.
    Transport,
    /// A single row or payload could not be decoded.
    Parse,
    /// The store failed; the pair's merge was rolled back.
    Persistence,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("source rejected {pair} as unsupported")]
    InvalidEntity { pair: PairKey },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEntity { .. } => ErrorKind::InvalidEntity,
            Self::Transport(_) | Self::Timeout { .. } => ErrorKind::Transport,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self.kind(), ErrorKind::InvalidEntity)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                what: error
                    .url()
                    .map(|url| url.to_string())
                    .unwrap_or_else(|| "request".to_string()),
                after: Duration::ZERO,
            }
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transport_kind() {
        let err = SyncError::Timeout { what: "page 2".to_string(), after: Duration::from_secs(3) };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "page 2 timed out after 3s");
    }

    #[test]
    fn test_invalid_entity_is_permanent() {
        let err = SyncError::InvalidEntity { pair: PairKey::new(7, 11) };
        assert_eq!(err.kind(), ErrorKind::InvalidEntity);
        assert!(!err.is_transient());
        assert_eq!(ErrorKind::InvalidEntity.to_string(), "INVALID_ENTITY");
    }

    #[test]
    fn test_store_error_converts_to_persistence() {
        let err: SyncError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
