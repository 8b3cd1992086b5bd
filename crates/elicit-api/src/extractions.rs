//! Handlers for curator writes under `/extractions/:id`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/extractions/:id/answer` | Body: `{"valid": bool}`; `null` withdraws the judgement |
//! | `GET`  | `/extractions/:id/explanation` | Every explanation, oldest first |
//! | `POST` | `/extractions/:id/explanation` | Body: `{"text":"..."}`; returns 201 + stored explanation |
//! | `POST` | `/extractions/:id/validated_context` | Body: `{"text":"..."}` |
//!
//! None of these recompute confidences.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use elicit_core::{
  Curation, EvidenceStore,
  record::{Explanation, ExtractionId},
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

fn not_found(id: ExtractionId) -> ApiError {
  ApiError::NotFound(format!("extraction {id} not found"))
}

// ─── Answer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
  pub valid: Option<bool>,
}

/// `POST /extractions/:id/answer`
pub async fn answer<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<ExtractionId>,
  Json(body): Json<AnswerBody>,
) -> Result<StatusCode, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let curation = Curation::new(Arc::as_ref(&state.store));
  let found = match body.valid {
    Some(valid) => curation.submit_answer(id, valid).await,
    None => curation.clear_answer(id).await,
  }
  .map_err(ApiError::store)?;

  if !found {
    return Err(not_found(id));
  }
  Ok(StatusCode::NO_CONTENT)
}

// ─── Explanations ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TextBody {
  pub text: String,
}

/// `GET /extractions/:id/explanation`
pub async fn explanations<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<ExtractionId>,
) -> Result<Json<Vec<Explanation>>, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let explanations = Curation::new(Arc::as_ref(&state.store))
    .explanations(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(explanations))
}

/// `POST /extractions/:id/explanation`
pub async fn explain<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<ExtractionId>,
  Json(body): Json<TextBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let explanation = Curation::new(Arc::as_ref(&state.store))
    .submit_explanation(id, body.text)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| not_found(id))?;
  Ok((StatusCode::CREATED, Json(explanation)))
}

// ─── Validated context ────────────────────────────────────────────────────────

/// `POST /extractions/:id/validated_context`
pub async fn validated_context<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<ExtractionId>,
  Json(body): Json<TextBody>,
) -> Result<StatusCode, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let found = Curation::new(Arc::as_ref(&state.store))
    .submit_validated_context(id, body.text)
    .await
    .map_err(ApiError::store)?;
  if !found {
    return Err(not_found(id));
  }
  Ok(StatusCode::NO_CONTENT)
}
