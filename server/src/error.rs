use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;

use crate::accounts::AccountError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Username already taken")]
    UserExists,

    #[error("Invalid credentials")]
    IncorrectCredentials,

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Service temporarily unavailable")]
    Unavailable,

    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UserExists => StatusCode::CONFLICT,
            ApiError::IncorrectCredentials => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Display never carries the internal cause.
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            message: self.to_string(),
        })
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::UserExists => ApiError::UserExists,
            AccountError::IncorrectCredentials => ApiError::IncorrectCredentials,
            AccountError::PasswordTooLong(_) => ApiError::BadRequest(err.to_string()),
            err if err.is_retryable() => {
                log::warn!("Account operation unavailable: {}", err);
                ApiError::Unavailable
            }
            err => {
                log::error!("Account operation failed: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
