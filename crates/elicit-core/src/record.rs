//! Persisted records and the composite read models built from them.
//!
//! Four tables hold all evidence: documents, variables (one row per candidate
//! value), extractions (one row per distinct piece of evidence) and raw
//! extractions (one row per method voting for that evidence). Curator
//! explanations live in a fifth, append-only table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DocumentId = i64;
pub type VariableId = i64;
pub type ExtractionId = i64;
pub type RawExtractionId = i64;

/// Method name reserved for human-entered values. Excluded from agreement
/// counts.
pub const MANUAL_METHOD: &str = "manual";

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub document_id:   DocumentId,
  pub document_name: String,
}

/// One candidate value of a variable within one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
  pub variable_id:      VariableId,
  pub document_id:      DocumentId,
  pub variable_name:    String,
  pub variable_value:   String,
  /// Written only by the confidence estimators.
  pub value_confidence: Option<f64>,
}

/// A distinct piece of textual evidence supporting a [`Variable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
  pub extraction_id:     ExtractionId,
  pub variable_id:       VariableId,
  pub exact_context:     String,
  pub local_context:     String,
  pub wider_context:     String,
  /// `None` until a curator has judged the evidence.
  pub valid:             Option<bool>,
  /// Written only by the confidence estimators.
  pub meta_confidence:   Option<f64>,
  pub validated_context: Option<String>,
}

/// One method's confidence in one [`Extraction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
  pub raw_extraction_id: RawExtractionId,
  pub extraction_id:     ExtractionId,
  pub method:            String,
  pub confidence:        f64,
}

/// A curator's free-text justification for a judgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
  pub explanation_id: i64,
  pub extraction_id:  ExtractionId,
  pub text:           String,
  pub recorded_at:    DateTime<Utc>,
}

// ─── Write results ───────────────────────────────────────────────────────────

/// What a single push touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
  pub document_id:       DocumentId,
  pub variable_id:       VariableId,
  pub extraction_id:     ExtractionId,
  pub raw_extraction_id: RawExtractionId,
  /// The evidence was recognised as an existing extraction.
  pub merged:            bool,
  /// The method had already voted for this extraction; its confidence was
  /// raised to the maximum of the two.
  pub raw_updated:       bool,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// An extraction joined with its variable and document, as fed to training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedExtraction {
  pub document_name: String,
  pub variable:      Variable,
  pub extraction:    Extraction,
}

/// An extraction with every method's vote for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEvidence {
  pub extraction: Extraction,
  pub raw:        Vec<RawExtraction>,
}

/// A variable row with all of its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEvidence {
  pub variable:    Variable,
  pub extractions: Vec<ExtractionEvidence>,
}

/// Everything stored for one variable name across all documents, read in a
/// single transaction. Every list is ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableSnapshot {
  pub variable_name: String,
  pub variables:     Vec<Variable>,
  pub extractions:   Vec<Extraction>,
  pub raw:           Vec<RawExtraction>,
}

/// Confidences computed by an estimator for one variable name. Rows not
/// listed keep their stored values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceUpdate {
  pub variable_name:    String,
  pub value_confidence: Vec<(VariableId, f64)>,
  pub meta_confidence:  Vec<(ExtractionId, f64)>,
}

impl ConfidenceUpdate {
  pub fn is_empty(&self) -> bool {
    self.value_confidence.is_empty() && self.meta_confidence.is_empty()
  }
}
