//! Confidence estimation.
//!
//! Each policy is a pure function from a [`VariableSnapshot`] to a
//! [`ConfidenceUpdate`]. The [`Estimator`] drives one over every variable
//! name in a store, writing each variable back in its own transaction.

pub mod agreement;
pub mod generative;
pub mod supervised;

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::{
  agreement::{Agreement, AgreementScore},
  generative::{EmLabelModel, GenerativeConfig, LabelMatrix, LabelModel, Vote},
  supervised::SupervisedConfig,
};
use crate::{
  Error, Result,
  record::{ConfidenceUpdate, ExtractionId, VariableId, VariableSnapshot},
  store::EvidenceStore,
};

// ─── Policy ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
  Agreement,
  Supervised,
  Generative,
}

impl Policy {
  pub const ALL: [Policy; 3] =
    [Policy::Agreement, Policy::Supervised, Policy::Generative];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Agreement => "agreement",
      Self::Supervised => "supervised",
      Self::Generative => "generative",
    }
  }
}

impl fmt::Display for Policy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error)]
#[error("unknown confidence policy {0:?}; expected agreement, supervised or generative")]
pub struct UnknownPolicy(pub String);

impl FromStr for Policy {
  type Err = UnknownPolicy;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|p| p.as_str() == s)
      .ok_or_else(|| UnknownPolicy(s.to_owned()))
  }
}

/// Settings for the policies that have any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
  pub supervised: SupervisedConfig,
  pub generative: GenerativeConfig,
}

/// Run one policy over one variable.
pub fn compute<M: LabelModel + ?Sized>(
  policy: Policy,
  snapshot: &VariableSnapshot,
  config: &EstimatorConfig,
  model: &M,
) -> Result<ConfidenceUpdate> {
  match policy {
    Policy::Agreement => Ok(agreement::estimate(snapshot)),
    Policy::Supervised => supervised::estimate(snapshot, &config.supervised),
    Policy::Generative => {
      generative::estimate(snapshot, &config.generative, model)
    }
  }
}

/// Each variable's best extraction score, `0.0` for variables without
/// scored evidence, in variable-id order.
pub(crate) fn best_per_variable(
  snapshot: &VariableSnapshot,
  meta_confidence: &[(ExtractionId, f64)],
) -> Vec<(VariableId, f64)> {
  let score: BTreeMap<ExtractionId, f64> =
    meta_confidence.iter().copied().collect();
  let mut best: BTreeMap<VariableId, f64> = snapshot
    .variables
    .iter()
    .map(|v| (v.variable_id, 0.0))
    .collect();
  for extraction in &snapshot.extractions {
    if let (Some(&s), Some(b)) = (
      score.get(&extraction.extraction_id),
      best.get_mut(&extraction.variable_id),
    ) {
      *b = b.max(s);
    }
  }
  best.into_iter().collect()
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Outcome of one estimator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  pub policy:  Policy,
  /// Variables whose confidences were rewritten.
  pub updated: Vec<String>,
  /// Variables left untouched for lack of training data.
  pub skipped: Vec<String>,
}

/// Recomputes confidences over a store.
pub struct Estimator<'s, S, M = EmLabelModel> {
  store:  &'s S,
  config: EstimatorConfig,
  model:  M,
}

impl<'s, S: EvidenceStore> Estimator<'s, S> {
  /// An estimator using the built-in EM label model for the generative
  /// policy.
  pub fn new(store: &'s S, config: EstimatorConfig) -> Self {
    let model = EmLabelModel::from(&config.generative);
    Self { store, config, model }
  }
}

impl<'s, S, M> Estimator<'s, S, M>
where
  S: EvidenceStore,
  S::Error: From<Error>,
  M: LabelModel,
{
  pub fn with_model(store: &'s S, config: EstimatorConfig, model: M) -> Self {
    Self { store, config, model }
  }

  /// Recompute every variable name under `policy`.
  ///
  /// Variables without enough training data are skipped and keep their
  /// stored confidences; any other failure aborts the run. Variables
  /// already written stay written.
  pub async fn run(&self, policy: Policy) -> Result<RunSummary, S::Error> {
    let mut summary =
      RunSummary { policy, updated: Vec::new(), skipped: Vec::new() };

    for name in self.store.list_variable_names().await? {
      let snapshot = self.store.variable_snapshot(&name).await?;
      match compute(policy, &snapshot, &self.config, &self.model) {
        Ok(update) => {
          self.store.write_confidences(&update).await?;
          summary.updated.push(name);
        }
        Err(e @ Error::InsufficientTrainingData { .. }) => {
          tracing::debug!(%policy, variable = %name, error = %e, "skipping variable");
          summary.skipped.push(name);
        }
        Err(e) => return Err(e.into()),
      }
    }

    tracing::info!(
      %policy,
      updated = summary.updated.len(),
      skipped = summary.skipped.len(),
      "confidence estimation finished"
    );
    Ok(summary)
  }
}
