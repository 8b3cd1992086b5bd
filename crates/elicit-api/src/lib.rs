//! JSON REST API for Elicit.
//!
//! Exposes an axum [`Router`] backed by any [`elicit_core::EvidenceStore`]:
//! the curation surface, monitoring summaries, explicit recalibration and
//! CSV export. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", elicit_api::api_router(store.clone(), estimator))
//! ```

pub mod documents;
pub mod error;
pub mod extractions;
pub mod monitoring;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use elicit_core::{EstimatorConfig, EvidenceStore};

pub use error::ApiError;

/// Shared state threaded through all handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:     Arc<S>,
  /// Settings for `POST /confidence/:policy`.
  pub estimator: EstimatorConfig,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, estimator: EstimatorConfig) -> Router<()>
where
  S: EvidenceStore + Clone + 'static,
  S::Error: From<elicit_core::Error>,
{
  Router::new()
    // Documents
    .route("/documents", get(documents::list::<S>))
    .route("/documents/{name}/variables", get(documents::variables::<S>))
    .route("/documents/{name}/status", get(documents::status::<S>))
    .route(
      "/documents/{name}/variables/{variable}/extractions",
      get(documents::extractions::<S>),
    )
    // Curation
    .route("/extractions/{id}/answer", post(extractions::answer::<S>))
    .route(
      "/extractions/{id}/explanation",
      get(extractions::explanations::<S>).post(extractions::explain::<S>),
    )
    .route(
      "/extractions/{id}/validated_context",
      post(extractions::validated_context::<S>),
    )
    // Monitoring
    .route("/variables", get(monitoring::variables::<S>))
    .route("/variables/{variable}/precision", get(monitoring::precision::<S>))
    .route("/performance", get(monitoring::performance::<S>))
    .route("/confidence/{policy}", post(monitoring::recalibrate::<S>))
    .route("/export.csv", get(monitoring::export_csv::<S>))
    .with_state(AppState { store, estimator })
}

// ─── Integration tests ────────────────────────────────────────────────────────
