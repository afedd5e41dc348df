use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::{
    models::RoomState,
    storage::{Retryable, StorageError},
};

/// Coarse classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong.
    Validation,
    /// The request is not allowed in the current room or game state.
    State,
    /// A referenced room, player or round does not exist.
    NotFound,
    /// Retrying later may succeed.
    Transient,
    /// Unexpected; needs an operator.
    Fatal,
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The caller is not allowed to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Another player in the room already uses this nickname.
    #[error("nickname `{0}` is already taken in this room")]
    NicknameExists(String),
    /// The room is not in the state the operation requires.
    #[error("room is {actual}, expected {expected}")]
    WrongRoomState {
        /// Required state.
        expected: RoomState,
        /// Stored state.
        actual: RoomState,
    },
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The player's room is no longer active.
    #[error("room is not active ({0})")]
    RoomNotActive(RoomState),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A stored phase is not one this server knows.
    #[error("unknown game phase `{0}`")]
    UnknownPhase(String),
    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Classification used by logging and by retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidInput(_)
            | ServiceError::NicknameExists(_)
            | ServiceError::Unauthorized(_) => ErrorKind::Validation,
            ServiceError::WrongRoomState { .. }
            | ServiceError::InvalidState(_)
            | ServiceError::RoomNotActive(_) => ErrorKind::State,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                ErrorKind::Transient
            }
            ServiceError::UnknownPhase(_) | ServiceError::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Stable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) => "UNAVAILABLE",
            ServiceError::Degraded => "DEGRADED",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::NicknameExists(_) => "NICKNAME_EXISTS",
            ServiceError::WrongRoomState { .. } => "WRONG_ROOM_STATE",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::RoomNotActive(_) => "ROOM_NOT_ACTIVE",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::UnknownPhase(_) => "UNKNOWN_PHASE",
            ServiceError::Internal(_) => "INTERNAL",
            ServiceError::Timeout => "TIMEOUT",
        }
    }
}

impl Retryable for ServiceError {
    fn is_transient(&self) -> bool {
        match self {
            ServiceError::Unavailable(source) => source.is_transient(),
            _ => false,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupt {
                column: "state",
                value,
            } => ServiceError::UnknownPhase(value),
            StorageError::Conflict { message } => ServiceError::InvalidState(message),
            err @ StorageError::Unavailable { .. } => ServiceError::Unavailable(err),
            err => ServiceError::Internal(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Validation => match err {
                ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
                _ => AppError::BadRequest(message),
            },
            ErrorKind::State => AppError::Conflict(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Transient => AppError::ServiceUnavailable(message),
            ErrorKind::Fatal => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_phase_maps_to_unknown_phase() {
        let err: ServiceError = StorageError::corrupt("state", "FIBBING_IT_LOBBY").into();
        assert!(matches!(err, ServiceError::UnknownPhase(ref v) if v == "FIBBING_IT_LOBBY"));
        assert_eq!(err.code(), "UNKNOWN_PHASE");
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn only_unavailable_storage_is_transient() {
        let transient: ServiceError =
            StorageError::unavailable("reset".into(), std::io::Error::other("reset")).into();
        assert!(transient.is_transient());

        let conflict: ServiceError = StorageError::conflict("duplicate").into();
        assert!(!conflict.is_transient());
        assert_eq!(conflict.kind(), ErrorKind::State);
    }

    #[test]
    fn wrong_room_state_is_a_state_error() {
        let err = ServiceError::WrongRoomState {
            expected: RoomState::Created,
            actual: RoomState::Playing,
        };
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(err.code(), "WRONG_ROOM_STATE");
        assert_eq!(err.to_string(), "room is PLAYING, expected CREATED");
    }
}
