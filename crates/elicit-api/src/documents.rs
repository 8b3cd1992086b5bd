//! Handlers for `/documents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/documents` | All documents, in id order |
//! | `GET`  | `/documents/:name/variables` | Every candidate value row of the document |
//! | `GET`  | `/documents/:name/status` | Curation progress |
//! | `GET`  | `/documents/:name/variables/:variable/extractions` | Candidates with agreement and evidence |
//!
//! Unknown document names read as empty, like every other list endpoint.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use elicit_core::{
  Curation, EvidenceStore,
  curation::{CandidateView, DocumentStatus},
  record::{Document, Variable},
};

use crate::{AppState, error::ApiError};

/// `GET /documents`
pub async fn list<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<Document>>, ApiError>
where
  S: EvidenceStore,
{
  let documents = state.store.list_documents().await.map_err(ApiError::store)?;
  Ok(Json(documents))
}

/// `GET /documents/:name/variables`
pub async fn variables<S>(
  State(state): State<AppState<S>>,
  Path(name): Path<String>,
) -> Result<Json<Vec<Variable>>, ApiError>
where
  S: EvidenceStore,
{
  let variables = state.store.get_variables(&name).await.map_err(ApiError::store)?;
  Ok(Json(variables))
}

/// `GET /documents/:name/status`
pub async fn status<S>(
  State(state): State<AppState<S>>,
  Path(name): Path<String>,
) -> Result<Json<DocumentStatus>, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let status = Curation::new(Arc::as_ref(&state.store))
    .document_status(&name)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(status))
}

/// `GET /documents/:name/variables/:variable/extractions`
pub async fn extractions<S>(
  State(state): State<AppState<S>>,
  Path((name, variable)): Path<(String, String)>,
) -> Result<Json<Vec<CandidateView>>, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let candidates = Curation::new(Arc::as_ref(&state.store))
    .document_extractions(&name, &variable)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(candidates))
}
