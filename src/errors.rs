use thiserror::Error;

/// Failures reported by a [`GameApi`](crate::api::GameApi) call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend rejected the credential (HTTP 401 or equivalent).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network unreachable, connection reset, unexpected HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The response body could not be understood.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Business-rule rejection reported by the server, surfaced verbatim.
    #[error("{0}")]
    Domain(String),
}

impl ApiError {
    /// Transport-class failures are transient: the caller abandons the current
    /// operation and timers keep running.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_) | ApiError::Timeout(_) | ApiError::Decode(_)
        )
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to the front end by [`GameClient`](crate::client::GameClient)
/// operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("not logged in")]
    NotAuthenticated,

    /// The session was torn down because the server rejected the credential.
    #[error("session expired, please log in again")]
    SessionExpired,

    #[error("not in a room")]
    NoRoom,

    #[error("already in room {0}")]
    AlreadyInRoom(String),

    #[error("a battle is already in progress")]
    BattleActive,

    #[error("no battle in progress")]
    NoBattle,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }
}
