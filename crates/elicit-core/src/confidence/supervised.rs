//! Supervised policy: a per-variable logistic regression over method votes.
//!
//! Each extraction becomes one feature vector with a slot per method that has
//! voted anywhere for the variable, holding that method's confidence (0 when
//! it did not vote for this extraction). Curated extractions are the training
//! set; every extraction is scored.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{ConfidenceUpdate, ExtractionId, VariableSnapshot},
};

/// Tuning for the supervised policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisedConfig {
  /// Minimum number of curated examples required of each class.
  pub min_per_class: usize,
  pub learning_rate: f64,
  pub epochs:        usize,
  /// L2 penalty on the weights (not the bias).
  pub l2:            f64,
}

impl Default for SupervisedConfig {
  fn default() -> Self {
    Self { min_per_class: 2, learning_rate: 0.5, epochs: 500, l2: 0.01 }
  }
}

// ─── Features ────────────────────────────────────────────────────────────────

/// Extraction × method confidence matrix for one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
  /// Column labels, sorted.
  pub methods:  Vec<String>,
  /// Row labels, in extraction-id order.
  pub rows:     Vec<ExtractionId>,
  pub features: Vec<Vec<f64>>,
  /// Curator judgement per row.
  pub labels:   Vec<Option<bool>>,
}

impl FeatureMatrix {
  pub fn from_snapshot(snapshot: &VariableSnapshot) -> Self {
    let methods: Vec<String> = snapshot
      .raw
      .iter()
      .map(|r| r.method.clone())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    let column: BTreeMap<&str, usize> = methods
      .iter()
      .enumerate()
      .map(|(i, m)| (m.as_str(), i))
      .collect();
    let row_of: BTreeMap<ExtractionId, usize> = snapshot
      .extractions
      .iter()
      .enumerate()
      .map(|(i, e)| (e.extraction_id, i))
      .collect();

    let mut features = vec![vec![0.0_f64; methods.len()]; snapshot.extractions.len()];
    for raw in &snapshot.raw {
      if let (Some(&row), Some(&col)) =
        (row_of.get(&raw.extraction_id), column.get(raw.method.as_str()))
      {
        features[row][col] = features[row][col].max(raw.confidence);
      }
    }

    Self {
      methods,
      rows: snapshot.extractions.iter().map(|e| e.extraction_id).collect(),
      features,
      labels: snapshot.extractions.iter().map(|e| e.valid).collect(),
    }
  }

  /// `(positives, negatives)` among curated rows.
  pub fn class_counts(&self) -> (usize, usize) {
    self.labels.iter().fold((0, 0), |(pos, neg), label| match label {
      Some(true) => (pos + 1, neg),
      Some(false) => (pos, neg + 1),
      None => (pos, neg),
    })
  }
}

// ─── Model ───────────────────────────────────────────────────────────────────

/// Binary logistic regression fitted by full-batch gradient descent from a
/// zero initialisation, so identical inputs give identical weights.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
  pub weights: Vec<f64>,
  pub bias:    f64,
}

impl LogisticRegression {
  pub fn fit(x: &[Vec<f64>], y: &[f64], config: &SupervisedConfig) -> Self {
    let dims = x.first().map_or(0, Vec::len);
    let mut model = Self { weights: vec![0.0; dims], bias: 0.0 };
    if x.is_empty() {
      return model;
    }
    let n = x.len() as f64;

    for _ in 0..config.epochs {
      let mut grad_w = vec![0.0; dims];
      let mut grad_b = 0.0;
      for (row, &target) in x.iter().zip(y) {
        let err = model.predict_proba(row) - target;
        for (g, &v) in grad_w.iter_mut().zip(row) {
          *g += err * v;
        }
        grad_b += err;
      }
      for (w, g) in model.weights.iter_mut().zip(&grad_w) {
        *w -= config.learning_rate * (g / n + config.l2 * *w);
      }
      model.bias -= config.learning_rate * grad_b / n;
    }
    model
  }

  pub fn predict_proba(&self, row: &[f64]) -> f64 {
    let z = self.bias
      + self.weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>();
    sigmoid(z)
  }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
  if z >= 0.0 {
    1.0 / (1.0 + (-z).exp())
  } else {
    let e = z.exp();
    e / (1.0 + e)
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Fit on the curated extractions of one variable and score all of them.
///
/// Each extraction's score becomes its `meta_confidence`; each value's
/// `value_confidence` is the best score among its extractions (0 without
/// evidence).
pub fn estimate(
  snapshot: &VariableSnapshot,
  config: &SupervisedConfig,
) -> Result<ConfidenceUpdate> {
  let matrix = FeatureMatrix::from_snapshot(snapshot);
  let (pos, neg) = matrix.class_counts();
  let required = config.min_per_class.max(1);
  if pos < required || neg < required {
    return Err(Error::InsufficientTrainingData {
      variable: snapshot.variable_name.clone(),
      reason:   format!(
        "{pos} positive and {neg} negative curated extractions; need {required} of each"
      ),
    });
  }

  let (train_x, train_y): (Vec<Vec<f64>>, Vec<f64>) = matrix
    .features
    .iter()
    .zip(&matrix.labels)
    .filter_map(|(row, label)| {
      label.map(|l| (row.clone(), if l { 1.0 } else { 0.0 }))
    })
    .unzip();
  let model = LogisticRegression::fit(&train_x, &train_y, config);

  let meta_confidence: Vec<(ExtractionId, f64)> = matrix
    .rows
    .iter()
    .zip(&matrix.features)
    .map(|(&id, row)| (id, model.predict_proba(row)))
    .collect();

  Ok(ConfidenceUpdate {
    variable_name: snapshot.variable_name.clone(),
    value_confidence: super::best_per_variable(snapshot, &meta_confidence),
    meta_confidence,
  })
}
