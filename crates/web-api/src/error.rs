use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::InvalidArgument { field, reason } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            DomainError::UnknownEvent { event } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "UNKNOWN_EVENT",
                format!("unknown event: {}", event),
            ),
            DomainError::MalformedFrame { message } => {
                ApiError::new(StatusCode::BAD_REQUEST, "MALFORMED_FRAME", message)
            }
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;

        match error {
            AppErr::Domain(err) => err.into(),
            AppErr::Store(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                format!("store error: {}", err),
            ),
            AppErr::SessionNotFound(id) => ApiError::new(
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("session not found: {}", id),
            ),
            AppErr::SessionClosed(id) => ApiError::new(
                StatusCode::CONFLICT,
                "SESSION_CLOSED",
                format!("session {} is closed", id),
            ),
            AppErr::NotIdentified(id) => ApiError::new(
                StatusCode::CONFLICT,
                "NOT_IDENTIFIED",
                format!("session {} has not joined yet", id),
            ),
            AppErr::HubUnavailable => ApiError::service_unavailable("gateway hub is not running"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
