//! The curation surface: what a reviewer reads and writes.
//!
//! Curators judge extractions (`valid`), correct the quoted span, and leave
//! explanations. None of these writes recompute confidences; a recalibration
//! is always an explicit [`Estimator`](crate::confidence::Estimator) run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  confidence::{agreement, best_per_variable},
  export,
  record::{
    DocumentId, Explanation, ExtractionEvidence, ExtractionId, RawExtraction,
    Variable, VariableId, VariableSnapshot,
  },
  store::EvidenceStore,
};

// ─── Views ───────────────────────────────────────────────────────────────────

/// One candidate value of a variable in a document, as shown to a curator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateView {
  pub variable_id:      VariableId,
  pub value:            String,
  pub value_confidence: Option<f64>,
  /// How many voting methods rank this value first, e.g. `2/3`.
  pub agreement:        agreement::AgreementScore,
  /// Whether this value currently wins the vote.
  pub leading:          bool,
  pub extractions:      Vec<ExtractionEvidence>,
}

/// Validated values of one document, keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
  pub document_name: String,
  pub values:        BTreeMap<String, Vec<String>>,
}

impl DocumentRecord {
  pub fn new(document_name: impl Into<String>) -> Self {
    Self { document_name: document_name.into(), values: BTreeMap::new() }
  }

  /// Add `value` under `variable`, keeping the first-seen order and
  /// ignoring repeats.
  pub fn accumulate(&mut self, variable: &str, value: &str) {
    let values = self.values.entry(variable.to_owned()).or_default();
    if !values.iter().any(|v| v == value) {
      values.push(value.to_owned());
    }
  }
}

/// Curation progress for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatus {
  /// Variable names with at least one extraction.
  pub with_evidence: usize,
  /// Variable names with at least one judged extraction.
  pub touched:       usize,
  /// Variable names whose every extraction has been judged.
  pub complete:      usize,
}

/// How the predicted value of a (document, variable) is chosen when scoring
/// estimator performance against curation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceKind {
  /// The agreement winner.
  #[default]
  Agreement,
  /// The value with the highest stored `value_confidence`.
  Confidence,
  /// The value owning the extraction with the highest stored
  /// `meta_confidence`.
  MetaConfidence,
}

// ─── Curation ────────────────────────────────────────────────────────────────

pub struct Curation<'s, S> {
  store: &'s S,
}

impl<'s, S> Curation<'s, S>
where
  S: EvidenceStore,
  S::Error: From<Error>,
{
  pub fn new(store: &'s S) -> Self { Self { store } }

  /// Record a curator's judgement. Returns `false` for an unknown
  /// extraction.
  pub async fn submit_answer(
    &self,
    extraction_id: ExtractionId,
    valid: bool,
  ) -> Result<bool, S::Error> {
    let found = self.store.set_valid(extraction_id, Some(valid)).await?;
    tracing::debug!(extraction_id, valid, found, "answer submitted");
    Ok(found)
  }

  /// Withdraw a judgement, returning the extraction to the unjudged state.
  pub async fn clear_answer(
    &self,
    extraction_id: ExtractionId,
  ) -> Result<bool, S::Error> {
    self.store.set_valid(extraction_id, None).await
  }

  pub async fn submit_explanation(
    &self,
    extraction_id: ExtractionId,
    text: String,
  ) -> Result<Option<Explanation>, S::Error> {
    self.store.record_explanation(extraction_id, text).await
  }

  pub async fn explanations(
    &self,
    extraction_id: ExtractionId,
  ) -> Result<Vec<Explanation>, S::Error> {
    self.store.get_explanations(extraction_id).await
  }

  /// Store the curator-corrected span of an extraction.
  pub async fn submit_validated_context(
    &self,
    extraction_id: ExtractionId,
    text: String,
  ) -> Result<bool, S::Error> {
    self.store.set_validated_context(extraction_id, text).await
  }

  /// Every candidate value of `variable_name` in `document` with its
  /// confidence, agreement score and evidence, in variable-id order.
  pub async fn document_extractions(
    &self,
    document: &str,
    variable_name: &str,
  ) -> Result<Vec<CandidateView>, S::Error> {
    let evidence = self.store.document_evidence(document, variable_name).await?;

    let variables: Vec<&Variable> = evidence.iter().map(|e| &e.variable).collect();
    let votes: BTreeMap<VariableId, Vec<&RawExtraction>> = evidence
      .iter()
      .map(|e| {
        let raw = e.extractions.iter().flat_map(|x| &x.raw).collect();
        (e.variable.variable_id, raw)
      })
      .collect();
    let outcome = agreement::vote(&variables, &votes);

    Ok(
      evidence
        .into_iter()
        .map(|e| {
          let id = e.variable.variable_id;
          let tally = outcome.as_ref().and_then(|a| a.tally_for(id));
          CandidateView {
            variable_id:      id,
            value:            e.variable.variable_value,
            value_confidence: e.variable.value_confidence,
            agreement:        tally.map(|t| t.score).unwrap_or_default(),
            leading:          outcome.as_ref().is_some_and(|a| a.winner == Some(id)),
            extractions:      e.extractions,
          }
        })
        .collect(),
    )
  }

  /// Validated values per document, for every document in the store.
  pub async fn download_data(&self) -> Result<Vec<DocumentRecord>, S::Error> {
    let mut records: BTreeMap<String, DocumentRecord> = self
      .store
      .list_documents()
      .await?
      .into_iter()
      .map(|d| (d.document_name.clone(), DocumentRecord::new(d.document_name)))
      .collect();

    for v in self.store.validated_values().await? {
      records
        .entry(v.document_name.clone())
        .or_insert_with(|| DocumentRecord::new(v.document_name.clone()))
        .accumulate(&v.variable_name, &v.variable_value);
    }
    Ok(records.into_values().collect())
  }

  /// [`download_data`](Self::download_data) as CSV: one row per document,
  /// one column per variable name.
  pub async fn export_csv(&self) -> Result<String, S::Error> {
    let records = self.download_data().await?;
    let variables = self.store.list_variable_names().await?;
    Ok(export::to_csv(&records, &variables)?)
  }

  /// Per-method precision for `variable_name` over judged extractions.
  ///
  /// The confidence mass (or, when `binary`, the vote count) a method put
  /// on valid evidence, over all it put on judged evidence. Methods that
  /// never voted on judged evidence are omitted.
  pub async fn method_precision(
    &self,
    variable_name: &str,
    binary: bool,
  ) -> Result<BTreeMap<String, f64>, S::Error> {
    let snapshot = self.store.variable_snapshot(variable_name).await?;
    Ok(method_precision(&snapshot, binary))
  }

  /// For each variable name with any curation, the share of judged
  /// (document, variable) pairs whose predicted value was validated.
  pub async fn performance(
    &self,
    kind: PerformanceKind,
  ) -> Result<BTreeMap<String, f64>, S::Error> {
    let mut out = BTreeMap::new();
    for name in self.store.list_variable_names().await? {
      let snapshot = self.store.variable_snapshot(&name).await?;
      if let Some(score) = performance(&snapshot, kind) {
        out.insert(name, score);
      }
    }
    Ok(out)
  }

  pub async fn document_status(
    &self,
    document: &str,
  ) -> Result<DocumentStatus, S::Error> {
    let names: BTreeSet<String> = self
      .store
      .get_variables(document)
      .await?
      .into_iter()
      .map(|v| v.variable_name)
      .collect();

    let mut status = DocumentStatus::default();
    for name in names {
      let evidence = self.store.document_evidence(document, &name).await?;
      let (total, done) = evidence
        .iter()
        .flat_map(|v| &v.extractions)
        .fold((0, 0), |(total, done), e| {
          (total + 1, done + usize::from(e.extraction.valid.is_some()))
        });
      if total == 0 {
        continue;
      }
      status.with_evidence += 1;
      if done > 0 {
        status.touched += 1;
      }
      if done == total {
        status.complete += 1;
      }
    }
    Ok(status)
  }
}

// ─── Monitoring ──────────────────────────────────────────────────────────────

pub fn method_precision(
  snapshot: &VariableSnapshot,
  binary: bool,
) -> BTreeMap<String, f64> {
  let valid: BTreeMap<ExtractionId, bool> = snapshot
    .extractions
    .iter()
    .filter_map(|e| e.valid.map(|v| (e.extraction_id, v)))
    .collect();

  let mut mass: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
  for raw in &snapshot.raw {
    let Some(&is_valid) = valid.get(&raw.extraction_id) else {
      continue;
    };
    let weight = if binary {
      if raw.confidence > 0.0 { 1.0 } else { 0.0 }
    } else {
      raw.confidence.max(0.0)
    };
    let (hit, total) = mass.entry(raw.method.as_str()).or_default();
    if is_valid {
      *hit += weight;
    }
    *total += weight;
  }

  mass
    .into_iter()
    .filter(|(_, (_, total))| *total > 0.0)
    .map(|(method, (hit, total))| (method.to_owned(), hit / total))
    .collect()
}

/// Share of judged documents whose predicted value is validated, or `None`
/// when no document has any judgement for this variable.
pub fn performance(snapshot: &VariableSnapshot, kind: PerformanceKind) -> Option<f64> {
  let document_of: BTreeMap<VariableId, DocumentId> = snapshot
    .variables
    .iter()
    .map(|v| (v.variable_id, v.document_id))
    .collect();

  let mut judged_documents = BTreeSet::new();
  let mut validated = BTreeSet::new();
  for e in &snapshot.extractions {
    if e.valid.is_some() {
      if let Some(&doc) = document_of.get(&e.variable_id) {
        judged_documents.insert(doc);
      }
    }
    if e.valid == Some(true) {
      validated.insert(e.variable_id);
    }
  }
  if judged_documents.is_empty() {
    return None;
  }

  let predicted: BTreeMap<DocumentId, VariableId> = match kind {
    PerformanceKind::Agreement => agreement::agreements(snapshot)
      .into_iter()
      .filter_map(|a| a.winner.map(|w| (a.document_id, w)))
      .collect(),
    PerformanceKind::Confidence => {
      let scores: Vec<(VariableId, f64)> = snapshot
        .variables
        .iter()
        .map(|v| (v.variable_id, v.value_confidence.unwrap_or(0.0)))
        .collect();
      argmax_per_document(&scores, &document_of)
    }
    PerformanceKind::MetaConfidence => {
      let meta: Vec<(ExtractionId, f64)> = snapshot
        .extractions
        .iter()
        .filter_map(|e| e.meta_confidence.map(|m| (e.extraction_id, m)))
        .collect();
      argmax_per_document(&best_per_variable(snapshot, &meta), &document_of)
    }
  };

  let hits = judged_documents
    .iter()
    .filter(|doc| predicted.get(doc).is_some_and(|v| validated.contains(v)))
    .count();
  Some(hits as f64 / judged_documents.len() as f64)
}

/// The highest-scoring variable of each document; ties go to the lower id
/// and documents where nothing scored above zero have no prediction.
fn argmax_per_document(
  scores: &[(VariableId, f64)],
  document_of: &BTreeMap<VariableId, DocumentId>,
) -> BTreeMap<DocumentId, VariableId> {
  let mut best: BTreeMap<DocumentId, (VariableId, f64)> = BTreeMap::new();
  for &(variable_id, score) in scores {
    let Some(&doc) = document_of.get(&variable_id) else {
      continue;
    };
    if score <= 0.0 {
      continue;
    }
    match best.get(&doc) {
      Some(&(_, current)) if current >= score => {}
      _ => {
        best.insert(doc, (variable_id, score));
      }
    }
  }
  best.into_iter().map(|(doc, (variable_id, _))| (doc, variable_id)).collect()
}
