//! The `EvidenceStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `elicit-store-sqlite`).
//! The estimators, the curation surface and the labelling-function runner
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  evidence::Candidate,
  record::{
    ConfidenceUpdate, Document, Explanation, ExtractionId, PushOutcome,
    ValidatedExtraction, Variable, VariableEvidence, VariableId,
    VariableSnapshot,
  },
  schema::Schema,
};

/// A `(document name, variable name, value)` triple judged valid by a curator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedValue {
  pub document_name:  String,
  pub variable_name:  String,
  pub variable_value: String,
}

/// Abstraction over an evidence store backend.
///
/// Every mutating method is a single transaction: it either applies in full
/// or leaves the store unchanged. Reads of names or ids that do not exist
/// return empty results rather than errors.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait EvidenceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The schema pushes are validated against.
  fn schema(&self) -> &Schema;

  // ── Writes from labelling functions ───────────────────────────────────

  /// Get or create the variable row for `(document, variable_name, value)`,
  /// creating the document on first reference.
  fn push_variable<'a>(
    &'a self,
    document: &'a str,
    variable_name: &'a str,
    value: &'a str,
  ) -> impl Future<Output = Result<VariableId, Self::Error>> + Send + 'a;

  /// Record one method's vote for a candidate value, merging its evidence
  /// into an existing extraction where the deduplication policy says it is
  /// the same evidence.
  ///
  /// Fails with a schema violation, writing nothing, when the value is not a
  /// declared category of the variable.
  fn push<'a>(
    &'a self,
    document: &'a str,
    variable_name: &'a str,
    candidate: Candidate,
    method: &'a str,
  ) -> impl Future<Output = Result<PushOutcome, Self::Error>> + Send + 'a;

  /// Pre-create a variable row for every declared value of every schema
  /// variable, for each document.
  fn prepare_documents<'a>(
    &'a self,
    documents: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Training reads ────────────────────────────────────────────────────

  /// Names of documents with at least one extraction of `variable_name`
  /// judged valid (or judged at all, with `include_negatives`).
  fn get_validated_document_names<'a>(
    &'a self,
    variable_name: &'a str,
    include_negatives: bool,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// Judged extractions of `variable_name` within `documents`.
  fn get_validated_extractions<'a>(
    &'a self,
    documents: &'a [String],
    variable_name: &'a str,
    include_negatives: bool,
  ) -> impl Future<Output = Result<Vec<ValidatedExtraction>, Self::Error>>
  + Send
  + 'a;

  // ── General reads ─────────────────────────────────────────────────────

  fn list_documents(
    &self,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Distinct variable names, sorted.
  fn list_variable_names(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// All variable rows of a document, ordered by id.
  fn get_variables<'a>(
    &'a self,
    document: &'a str,
  ) -> impl Future<Output = Result<Vec<Variable>, Self::Error>> + Send + 'a;

  /// Every candidate value of `variable_name` in `document`, with its
  /// extractions and their raw votes, ordered by id.
  fn document_evidence<'a>(
    &'a self,
    document: &'a str,
    variable_name: &'a str,
  ) -> impl Future<Output = Result<Vec<VariableEvidence>, Self::Error>> + Send + 'a;

  /// A consistent read of everything stored for `variable_name`.
  fn variable_snapshot<'a>(
    &'a self,
    variable_name: &'a str,
  ) -> impl Future<Output = Result<VariableSnapshot, Self::Error>> + Send + 'a;

  /// All curator-validated values, ordered by document then variable id.
  fn validated_values(
    &self,
  ) -> impl Future<Output = Result<Vec<ValidatedValue>, Self::Error>> + Send + '_;

  // ── Curation writes ───────────────────────────────────────────────────

  /// Set or clear `valid`. Returns `false` if the extraction does not exist.
  fn set_valid(
    &self,
    extraction_id: ExtractionId,
    valid: Option<bool>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Returns `false` if the extraction does not exist.
  fn set_validated_context(
    &self,
    extraction_id: ExtractionId,
    text: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Append an explanation. Returns `None` if the extraction does not exist.
  fn record_explanation(
    &self,
    extraction_id: ExtractionId,
    text: String,
  ) -> impl Future<Output = Result<Option<Explanation>, Self::Error>> + Send + '_;

  fn get_explanations(
    &self,
    extraction_id: ExtractionId,
  ) -> impl Future<Output = Result<Vec<Explanation>, Self::Error>> + Send + '_;

  // ── Estimator writes ──────────────────────────────────────────────────

  /// Write an estimator's output for one variable in a single transaction.
  fn write_confidences<'a>(
    &'a self,
    update: &'a ConfidenceUpdate,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
