use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tether_types::Error;

/// Handler-level error. Wraps the domain error and renders every failure as
/// `{"error": <message>, "code": <kind>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] Error),

    /// No bearer token, or one that does not verify.
    #[error("missing or invalid credentials")]
    MissingCredentials,
}

pub type ApiResult<T> = Result<T, ApiError>;

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidArgument(_)
        | Error::NotFound(_)
        | Error::Conflict(_)
        | Error::NotConnected
        | Error::Unauthorized(_) => StatusCode::BAD_REQUEST,
        Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::Persistence(_) | Error::PartialSuccess { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Domain(err) => {
                let status = status_for(err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }
                (status, err.kind(), err.public_message())
            }
            ApiError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                self.to_string(),
            ),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::ConflictReason;

    #[test]
    fn relationship_failures_are_bad_requests() {
        assert_eq!(status_for(&Error::NotConnected), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::Conflict(ConflictReason::AlreadyConnected)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&Error::Unauthorized("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&Error::Unauthenticated("x".into())),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn store_failures_are_opaque() {
        let response = ApiError::from(Error::Persistence("SQLITE_BUSY".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
