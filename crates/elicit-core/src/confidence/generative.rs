//! Generative policy: a label model over the methods' votes.
//!
//! Every extraction of a variable is one example. Each method either voted
//! for it (with a confidence), voted for a different value in the same
//! document (a negative vote), or said nothing about that document. A
//! [`LabelModel`] turns that vote matrix into a probability per example that
//! the evidence is correct.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{
    ConfidenceUpdate, DocumentId, ExtractionId, VariableId, VariableSnapshot,
  },
};

use super::supervised::sigmoid;

const MIN_RATE: f64 = 1e-3;
const MAX_RATE: f64 = 1.0 - 1e-3;

/// Tuning for the generative policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerativeConfig {
  /// Fewer distinct voting methods than this and the variable is skipped.
  pub min_methods:      usize,
  /// Fixed prior probability that an example is correct. Learned when unset.
  pub class_balance:    Option<f64>,
  /// Pin curated examples to their judgement while fitting.
  pub use_ground_truth: bool,
  pub iterations:       usize,
  /// Laplace pseudo-count added to every rate estimate.
  pub smoothing:        f64,
}

impl Default for GenerativeConfig {
  fn default() -> Self {
    Self {
      min_methods:      2,
      class_balance:    None,
      use_ground_truth: true,
      iterations:       100,
      smoothing:        1.0,
    }
  }
}

// ─── Vote matrix ─────────────────────────────────────────────────────────────

/// One method's opinion of one example.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "vote", content = "confidence")]
pub enum Vote {
  Abstain,
  /// The method backed a different value for the same document.
  Negative,
  /// The method backed this evidence, with a confidence in `[0, 1]`.
  Positive(f64),
}

/// Example × method vote matrix for one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatrix {
  /// Column labels, sorted.
  pub methods: Vec<String>,
  /// Row labels, in extraction-id order.
  pub rows:    Vec<ExtractionId>,
  pub votes:   Vec<Vec<Vote>>,
  /// Curator judgement per row.
  pub labels:  Vec<Option<bool>>,
}

impl LabelMatrix {
  pub fn from_snapshot(snapshot: &VariableSnapshot) -> Self {
    let document_of: BTreeMap<VariableId, DocumentId> = snapshot
      .variables
      .iter()
      .map(|v| (v.variable_id, v.document_id))
      .collect();
    let owner: BTreeMap<ExtractionId, (DocumentId, VariableId)> = snapshot
      .extractions
      .iter()
      .filter_map(|e| {
        document_of
          .get(&e.variable_id)
          .map(|&doc| (e.extraction_id, (doc, e.variable_id)))
      })
      .collect();

    // (method, extraction) → strongest positive vote
    let mut positive: BTreeMap<(&str, ExtractionId), f64> = BTreeMap::new();
    // (method, document) → values the method backed there
    let mut backed: BTreeMap<(&str, DocumentId), BTreeSet<VariableId>> =
      BTreeMap::new();
    for raw in &snapshot.raw {
      let Some(&(doc, variable_id)) = owner.get(&raw.extraction_id) else {
        continue;
      };
      if raw.confidence <= 0.0 {
        continue;
      }
      let slot = positive
        .entry((raw.method.as_str(), raw.extraction_id))
        .or_insert(0.0);
      *slot = slot.max(raw.confidence.min(1.0));
      backed
        .entry((raw.method.as_str(), doc))
        .or_default()
        .insert(variable_id);
    }

    let methods: Vec<String> = backed
      .keys()
      .map(|(method, _)| (*method).to_owned())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();

    let mut rows = Vec::new();
    let mut votes = Vec::new();
    let mut labels = Vec::new();
    for extraction in &snapshot.extractions {
      let Some(&(doc, variable_id)) = owner.get(&extraction.extraction_id) else {
        continue;
      };
      let row = methods
        .iter()
        .map(|method| {
          let method = method.as_str();
          if let Some(&c) = positive.get(&(method, extraction.extraction_id)) {
            return Vote::Positive(c);
          }
          match backed.get(&(method, doc)) {
            Some(values) if values.iter().any(|&v| v != variable_id) => {
              Vote::Negative
            }
            _ => Vote::Abstain,
          }
        })
        .collect();
      rows.push(extraction.extraction_id);
      votes.push(row);
      labels.push(extraction.valid);
    }

    Self { methods, rows, votes, labels }
  }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

// ─── Label model ─────────────────────────────────────────────────────────────

/// Turns a vote matrix into one probability per row that the row's evidence
/// is correct.
pub trait LabelModel: Send + Sync {
  /// `ground_truth` has one entry per row; `Some` entries are known labels.
  /// Must return exactly one probability per row.
  fn fit_predict(
    &self,
    matrix: &LabelMatrix,
    class_balance: Option<f64>,
    ground_truth: &[Option<bool>],
  ) -> Result<Vec<f64>>;
}

/// Two-coin Dawid–Skene model fitted by expectation maximisation.
///
/// Each method has a true-positive rate (how strongly it votes for correct
/// evidence) and a false-positive rate (how strongly it votes for incorrect
/// evidence). A positive vote with confidence `c` counts as `c` of a vote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmLabelModel {
  pub iterations: usize,
  pub smoothing:  f64,
}

impl Default for EmLabelModel {
  fn default() -> Self { Self::from(&GenerativeConfig::default()) }
}

impl From<&GenerativeConfig> for EmLabelModel {
  fn from(config: &GenerativeConfig) -> Self {
    Self { iterations: config.iterations, smoothing: config.smoothing }
  }
}

#[derive(Debug, Clone, Copy)]
struct Rates {
  tpr: f64,
  fpr: f64,
}

impl Rates {
  fn log_odds(&self, vote: Vote) -> f64 {
    let miss = ((1.0 - self.tpr) / (1.0 - self.fpr)).ln();
    match vote {
      Vote::Abstain => 0.0,
      Vote::Negative => miss,
      Vote::Positive(c) => c * (self.tpr / self.fpr).ln() + (1.0 - c) * miss,
    }
  }
}

impl EmLabelModel {
  fn posteriors(
    &self,
    matrix: &LabelMatrix,
    rates: &[Rates],
    prior: f64,
    ground_truth: &[Option<bool>],
  ) -> Vec<f64> {
    let prior_odds = (prior / (1.0 - prior)).ln();
    matrix
      .votes
      .iter()
      .enumerate()
      .map(|(i, row)| match ground_truth.get(i).copied().flatten() {
        Some(true) => 1.0,
        Some(false) => 0.0,
        None => {
          let z = prior_odds
            + row
              .iter()
              .zip(rates)
              .map(|(&vote, r)| r.log_odds(vote))
              .sum::<f64>();
          sigmoid(z)
        }
      })
      .collect()
  }
}

impl LabelModel for EmLabelModel {
  fn fit_predict(
    &self,
    matrix: &LabelMatrix,
    class_balance: Option<f64>,
    ground_truth: &[Option<bool>],
  ) -> Result<Vec<f64>> {
    if matrix.is_empty() {
      return Ok(Vec::new());
    }
    let a = self.smoothing.max(0.0);
    let n = matrix.rows.len() as f64;
    let mut rates = vec![Rates { tpr: 0.7, fpr: 0.3 }; matrix.methods.len()];
    let mut prior = class_balance.unwrap_or(0.5).clamp(MIN_RATE, MAX_RATE);

    for _ in 0..self.iterations {
      let q = self.posteriors(matrix, &rates, prior, ground_truth);

      for (j, rate) in rates.iter_mut().enumerate() {
        let (mut hit_pos, mut mass_pos, mut hit_neg, mut mass_neg) =
          (0.0, 0.0, 0.0, 0.0);
        for (row, &qi) in matrix.votes.iter().zip(&q) {
          let strength = match row[j] {
            Vote::Abstain => continue,
            Vote::Negative => 0.0,
            Vote::Positive(c) => c,
          };
          hit_pos += qi * strength;
          mass_pos += qi;
          hit_neg += (1.0 - qi) * strength;
          mass_neg += 1.0 - qi;
        }
        rate.tpr = ((hit_pos + a) / (mass_pos + 2.0 * a)).clamp(MIN_RATE, MAX_RATE);
        rate.fpr = ((hit_neg + a) / (mass_neg + 2.0 * a)).clamp(MIN_RATE, MAX_RATE);
      }

      if class_balance.is_none() {
        prior =
          ((q.iter().sum::<f64>() + a) / (n + 2.0 * a)).clamp(MIN_RATE, MAX_RATE);
      }
    }

    Ok(self.posteriors(matrix, &rates, prior, ground_truth))
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Fit the label model over one variable and score every extraction.
pub fn estimate<M: LabelModel + ?Sized>(
  snapshot: &VariableSnapshot,
  config: &GenerativeConfig,
  model: &M,
) -> Result<ConfidenceUpdate> {
  let matrix = LabelMatrix::from_snapshot(snapshot);
  if matrix.methods.len() < config.min_methods.max(1) {
    return Err(Error::InsufficientTrainingData {
      variable: snapshot.variable_name.clone(),
      reason:   format!(
        "{} voting methods; need {}",
        matrix.methods.len(),
        config.min_methods
      ),
    });
  }

  let ground_truth = if config.use_ground_truth {
    matrix.labels.clone()
  } else {
    vec![None; matrix.rows.len()]
  };
  let probabilities =
    model.fit_predict(&matrix, config.class_balance, &ground_truth)?;
  if probabilities.len() != matrix.rows.len() {
    return Err(Error::LabelModelOutput {
      variable: snapshot.variable_name.clone(),
      expected: matrix.rows.len(),
      actual:   probabilities.len(),
    });
  }

  let meta_confidence: Vec<(ExtractionId, f64)> =
    matrix.rows.iter().copied().zip(probabilities).collect();

  Ok(ConfidenceUpdate {
    variable_name: snapshot.variable_name.clone(),
    value_confidence: super::best_per_variable(snapshot, &meta_confidence),
    meta_confidence,
  })
}
