//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use murmur_core::Error as ChatError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
///
/// [`ApiError::NoCaller`] is raised when the [`crate::caller::ACCOUNT_HEADER`]
/// header is absent.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing or malformed x-account-id header")]
  NoCaller,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Chat(#[from] ChatError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NoCaller => StatusCode::UNAUTHORIZED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Chat(e) => match e {
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
        ChatError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ChatError::InvalidState(_) | ChatError::Conflict(_) => StatusCode::CONFLICT,
        ChatError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(%status, "request failed: {self}");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
