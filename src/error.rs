//! Error taxonomy for the HTTP/WS surface.
//!
//! Every failure is recoverable: extraction and generation errors leave prior
//! state untouched, grading failures leave the question awaiting an answer,
//! and quota rejections short-circuit before any external call.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::extract::ExtractionError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),
  #[error("invalid webhook signature")]
  InvalidSignature,
  #[error("unknown session: {0}")]
  UnknownSession(String),
  #[error(transparent)]
  Session(#[from] SessionError),
  #[error(transparent)]
  Extraction(#[from] ExtractionError),
  #[error("daily free limit of {0} generations reached")]
  QuotaExceeded(u32),
  #[error("AI integration disabled (GEMINI_API_KEY not set)")]
  AiDisabled,
  #[error("upstream AI call failed: {0}")]
  Upstream(String),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::InvalidSignature => StatusCode::UNAUTHORIZED,
      ApiError::UnknownSession(_) => StatusCode::NOT_FOUND,
      ApiError::Session(_) => StatusCode::CONFLICT,
      ApiError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
      ApiError::AiDisabled => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
  }

  fn code(&self) -> &'static str {
    match self {
      ApiError::BadRequest(_) => "bad_request",
      ApiError::InvalidSignature => "invalid_signature",
      ApiError::UnknownSession(_) => "unknown_session",
      ApiError::Session(_) => "invalid_transition",
      ApiError::Extraction(_) => "extraction_failed",
      ApiError::QuotaExceeded(_) => "quota_exceeded",
      ApiError::AiDisabled => "ai_disabled",
      ApiError::Upstream(_) => "upstream_failed",
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  code: &'static str,
  /// Set on quota rejections so the client can route to the upgrade flow.
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  upgrade_required: bool,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = ErrorBody {
      error: self.to_string(),
      code: self.code(),
      upgrade_required: matches!(self, ApiError::QuotaExceeded(_)),
    };
    (self.status(), Json(body)).into_response()
  }
}
