use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ourabridge_connect::ConnectError;
use ourabridge_core::errors::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("{0}")]
    Connect(#[from] ConnectError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ApiError::Core(e) => e.is_fatal(),
            ApiError::Connect(e) => e.is_fatal(),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e {
                CoreError::InvalidUsername(_) | CoreError::UsernameTaken => StatusCode::BAD_REQUEST,
                CoreError::UnknownUser(_) => StatusCode::NOT_FOUND,
                CoreError::Credential(_) | CoreError::Protocol(_) => StatusCode::BAD_REQUEST,
                CoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Connect(e) => match e {
                ConnectError::Auth(_) | ConnectError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                ConnectError::Core(inner) if inner.is_fatal() => StatusCode::INTERNAL_SERVER_ERROR,
                ConnectError::Core(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors go back to the browser as plain text.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        } else {
            tracing::info!("request rejected ({status}): {self}");
        }
        (status, self.to_string()).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors() {
        assert_eq!(
            ApiError::from(CoreError::UsernameTaken).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ConnectError::api(503, "down")).status(),
            StatusCode::BAD_GATEWAY
        );
        let fatal = ApiError::from(CoreError::Persistence("disk".into()));
        assert!(fatal.is_fatal());
        assert_eq!(fatal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
