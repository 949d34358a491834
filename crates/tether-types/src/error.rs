use std::fmt;

use uuid::Uuid;

/// Why a relationship mutation collided with existing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    AlreadyConnected,
    RequestExists,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConnected => f.write_str("users are already connected"),
            Self::RequestExists => {
                f.write_str("a pending request already exists between these users")
            }
        }
    }
}

/// Domain error shared by the graph, the message store, the router and the
/// HTTP/push surfaces. `kind()` is the stable machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(String),

    /// The caller's credential does not identify the acting user.
    #[error("{0}")]
    Unauthenticated(String),

    /// The caller is not a party to / owner of the resource.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(ConflictReason),

    #[error("users are not connected")]
    NotConnected,

    /// Raw store failure. The message is for logs only.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The connection was created but its originating request could not be cleaned up.
    #[error("connection {connection_id} created but request cleanup failed: {reason}")]
    PartialSuccess { connection_id: Uuid, reason: String },
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::NotConnected => "not_connected",
            Self::Persistence(_) => "persistence_error",
            Self::PartialSuccess { .. } => "partial_success",
        }
    }

    /// Message safe to show an end user. Store internals are replaced with a generic text.
    pub fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) => "An internal error occurred".to_string(),
            Self::PartialSuccess { connection_id, .. } => format!(
                "connection {connection_id} was created but the request could not be cleaned up"
            ),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_details_are_not_public() {
        let err = Error::Persistence("disk I/O error at page 7".into());
        assert_eq!(err.kind(), "persistence_error");
        assert!(!err.public_message().contains("page 7"));
    }

    #[test]
    fn conflict_messages_name_the_reason() {
        assert!(
            Error::Conflict(ConflictReason::AlreadyConnected)
                .to_string()
                .contains("already connected")
        );
        assert_eq!(Error::Conflict(ConflictReason::RequestExists).kind(), "conflict");
    }
}
