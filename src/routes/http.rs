//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs include parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, State},
  http::HeaderMap,
  response::IntoResponse,
  Json,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_materials(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(MaterialsOut { materials: state.materials.list().await })
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len()))]
pub async fn http_save_material(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SaveMaterialIn>,
) -> Result<impl IntoResponse, ApiError> {
  let material = logic::save_pasted_material(&state, &body.text, body.name).await?;
  info!(target: "sulva_backend", id = %material.id, "Material saved");
  Ok(Json(material))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_material(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  let deleted = state.materials.delete(&id).await;
  Json(MaterialDeletedOut { id, deleted })
}

#[instrument(level = "info", skip(state, body), fields(%body.file_name))]
pub async fn http_ingest(
  State(state): State<Arc<AppState>>,
  Json(body): Json<IngestIn>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::ingest_document(&state, body).await?))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.mode, body.count))]
pub async fn http_generate_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizIn>,
) -> Result<impl IntoResponse, ApiError> {
  let out =
    logic::generate_quiz(&state, &body.user_id, &body.source_text, body.mode, body.count).await?;
  info!(target: "session", session_id = %out.session_id, "HTTP quiz generated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id))]
pub async fn http_blueprint(
  State(state): State<Arc<AppState>>,
  Json(body): Json<BlueprintIn>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::generate_blueprint(&state, &body.user_id, &body.source_text).await?))
}

#[instrument(level = "info", skip(state, body), fields(chapter_count = body.chapters.len()))]
pub async fn http_chapter_details(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChapterDetailsIn>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::chapter_details(&state, &body.source_text, &body.chapters).await?))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %id))]
pub async fn http_submit_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::submit_answer(&state, &id, body).await?))
}

#[instrument(level = "info", skip(state), fields(session_id = %id))]
pub async fn http_advance(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::advance(&state, &id).await?))
}

#[instrument(level = "info", skip(state), fields(session_id = %id))]
pub async fn http_restart(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::restart(&state, &id).await?))
}

#[instrument(level = "info", skip(state), fields(session_id = %id))]
pub async fn http_summary(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(logic::summary(&state, &id).await?))
}

//
// Billing webhook (Paystack)
//

#[derive(Debug, Deserialize)]
struct WebhookEvent {
  event: String,
  #[serde(default)]
  data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
  #[serde(default)]
  metadata: Option<WebhookMetadata>,
}

#[derive(Debug, Deserialize)]
struct WebhookMetadata {
  #[serde(default)]
  user_id: Option<String>,
}

/// Payment webhook. The signature header is an HMAC-SHA512 of the raw request
/// body under the shared secret; anything that does not verify is rejected
/// before the body is even parsed. Only `charge.success` changes state.
#[instrument(level = "info", skip(state, headers, body), fields(body_len = body.len()))]
pub async fn http_billing_webhook(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  body: String,
) -> Result<impl IntoResponse, ApiError> {
  let secret = state.webhook_secret.as_deref().ok_or(ApiError::InvalidSignature)?;
  let signature = headers
    .get("x-paystack-signature")
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::InvalidSignature)?;

  let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
    .map_err(|_| ApiError::InvalidSignature)?;
  mac.update(body.as_bytes());
  let expected = hex::encode(mac.finalize().into_bytes());
  if !expected.eq_ignore_ascii_case(signature) {
    warn!(target: "sulva_backend", "Webhook signature mismatch");
    return Err(ApiError::InvalidSignature);
  }

  let event: WebhookEvent = serde_json::from_str(&body)
    .map_err(|e| ApiError::BadRequest(format!("invalid webhook body: {e}")))?;

  if event.event == "charge.success" {
    match event.data.metadata.and_then(|m| m.user_id) {
      Some(user_id) if !user_id.is_empty() => {
        let until = chrono::Utc::now() + chrono::Duration::days(30);
        state.quota.activate(&user_id, until).await;
        info!(target: "quota", %user_id, event = %event.event, "Webhook processed");
      }
      _ => {
        warn!(target: "sulva_backend", event = %event.event, "charge.success without user_id metadata");
        return Err(ApiError::BadRequest("charge.success without metadata.user_id".into()));
      }
    }
  } else {
    info!(target: "sulva_backend", event = %event.event, "Webhook event ignored");
  }

  Ok(Json(WebhookAck { received: true }))
}
