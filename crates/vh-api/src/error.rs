//! HTTP rendering of domain failures.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use vh_core::AppError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] AppError),

    /// No `X-User-Id` header on a route that needs an actor
    #[error("missing identity header X-User-Id")]
    Unauthenticated,

    /// Malformed path, query or body
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Domain(err) => err.kind(),
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => match err {
                AppError::NotFound(..) | AppError::VoteNotFound(_) => StatusCode::NOT_FOUND,
                AppError::Forbidden(_) => StatusCode::FORBIDDEN,
                AppError::AlreadyVoted(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
                AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AppError::CrossProject { .. } | AppError::DepthExceeded { .. } => StatusCode::BAD_REQUEST,
                AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Domain(AppError::Internal(detail)) => {
                tracing::error!(error = %detail, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message,
        })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
