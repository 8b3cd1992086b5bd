//! Handlers for variable-level summaries, recalibration and export.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/variables` | Distinct variable names, sorted |
//! | `GET`  | `/variables/:variable/precision` | `?binary=true` counts votes instead of summing confidence |
//! | `GET`  | `/performance` | `?kind=agreement\|confidence\|meta_confidence` |
//! | `POST` | `/confidence/:policy` | Runs one estimator over every variable |
//! | `GET`  | `/export.csv` | Validated values, one row per document |

use std::{collections::BTreeMap, sync::Arc};

use axum::{
  Json,
  extract::{Path, Query, State},
  http::header,
  response::IntoResponse,
};
use elicit_core::{
  Curation, Estimator, EvidenceStore, PerformanceKind, Policy, RunSummary,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// `GET /variables`
pub async fn variables<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<String>>, ApiError>
where
  S: EvidenceStore,
{
  let names = state.store.list_variable_names().await.map_err(ApiError::store)?;
  Ok(Json(names))
}

// ─── Precision ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct PrecisionParams {
  #[serde(default)]
  pub binary: bool,
}

/// `GET /variables/:variable/precision[?binary=true]`
pub async fn precision<S>(
  State(state): State<AppState<S>>,
  Path(variable): Path<String>,
  Query(params): Query<PrecisionParams>,
) -> Result<Json<BTreeMap<String, f64>>, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let precision = Curation::new(Arc::as_ref(&state.store))
    .method_precision(&variable, params.binary)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(precision))
}

// ─── Performance ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct PerformanceParams {
  pub kind: Option<PerformanceKind>,
}

/// `GET /performance[?kind=...]`
pub async fn performance<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<PerformanceParams>,
) -> Result<Json<BTreeMap<String, f64>>, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let performance = Curation::new(Arc::as_ref(&state.store))
    .performance(params.kind.unwrap_or_default())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(performance))
}

// ─── Recalibration ────────────────────────────────────────────────────────────

/// `POST /confidence/:policy` where `policy` is `agreement`, `supervised` or
/// `generative`.
pub async fn recalibrate<S>(
  State(state): State<AppState<S>>,
  Path(policy): Path<String>,
) -> Result<Json<RunSummary>, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let policy: Policy =
    policy.parse().map_err(|e: elicit_core::confidence::UnknownPolicy| {
      ApiError::BadRequest(e.to_string())
    })?;
  let summary = Estimator::new(Arc::as_ref(&state.store), state.estimator)
    .run(policy)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(summary))
}

// ─── Export ───────────────────────────────────────────────────────────────────

/// `GET /export.csv`
pub async fn export_csv<S>(
  State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvidenceStore,
  S::Error: From<elicit_core::Error>,
{
  let csv = Curation::new(Arc::as_ref(&state.store))
    .export_csv()
    .await
    .map_err(ApiError::store)?;
  Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv))
}
