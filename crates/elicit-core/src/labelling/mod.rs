//! Labelling functions and the sequential runner that feeds their votes into
//! a store.
//!
//! A labelling function is configured cheaply and then explicitly loaded,
//! producing a handle that owns whatever is expensive (compiled patterns,
//! models). The runner loads one function at a time, applies it to every
//! document, and drops the handle before the next function is loaded.

pub mod keyword;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  evidence::Candidate,
  schema::VariableKind,
  store::EvidenceStore,
};

pub use self::keyword::KeywordMatch;

/// A document as handed to labelling functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
  pub name: String,
  pub text: String,
}

impl SourceDocument {
  pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
    Self { name: name.into(), text: text.into() }
  }
}

pub trait LabellingFunction {
  type Loaded: LoadedFunction;

  /// Method name recorded against every vote.
  fn method(&self) -> &str;

  /// Whether this function proposes values for variables of `kind`.
  fn handles(&self, kind: &VariableKind) -> bool;

  fn load(&self) -> Result<Self::Loaded>;
}

pub trait LoadedFunction {
  /// Every candidate this function proposes for one variable of one
  /// document.
  fn extract(
    &self,
    document: &str,
    variable: &str,
    kind: &VariableKind,
    text: &str,
  ) -> Result<Vec<Candidate>>;
}

/// Counts from one labelling-function run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
  pub method:    String,
  pub documents: usize,
  /// Candidates written, including those merged into existing evidence.
  pub pushed:    usize,
  pub merged:    usize,
  /// Candidates refused by the schema.
  pub rejected:  usize,
  /// Documents the function failed on.
  pub failed:    usize,
}

/// Applies labelling functions to documents and pushes their candidates.
pub struct Runner<'s, S> {
  store: &'s S,
}

impl<'s, S> Runner<'s, S>
where
  S: EvidenceStore,
  S::Error: From<Error>,
{
  pub fn new(store: &'s S) -> Self { Self { store } }

  /// Pre-create the declared variable rows for `documents`.
  pub async fn prepare(&self, documents: &[SourceDocument]) -> Result<(), S::Error> {
    let names: Vec<String> = documents.iter().map(|d| d.name.clone()).collect();
    self.store.prepare_documents(&names).await
  }

  /// Run one labelling function over every document.
  ///
  /// All of a document's candidates are collected before any is pushed, so
  /// a function that fails part-way through a document writes nothing for
  /// it. Such failures are logged and the run moves on to the next
  /// document; storage errors abort the run.
  pub async fn run<F: LabellingFunction>(
    &self,
    function: &F,
    documents: &[SourceDocument],
  ) -> Result<RunReport, S::Error> {
    let method = function.method();
    let schema = self.store.schema();
    let loaded = function.load()?;
    tracing::info!(method, documents = documents.len(), "running labelling function");

    let mut report = RunReport { method: method.to_owned(), ..Default::default() };
    for document in documents {
      report.documents += 1;

      let mut collected = Vec::new();
      let mut failure = None;
      for (variable, kind) in schema.variables() {
        if !function.handles(kind) {
          continue;
        }
        match loaded.extract(&document.name, variable, kind, &document.text) {
          Ok(candidates) => {
            collected.extend(candidates.into_iter().map(|c| (variable, c)));
          }
          Err(e) => {
            failure = Some(Error::ExternalSourceFailure {
              method:   method.to_owned(),
              document: document.name.clone(),
              message:  format!("{variable}: {e}"),
            });
            break;
          }
        }
      }
      if let Some(e) = failure {
        tracing::error!(error = %e, "labelling function failed");
        report.failed += 1;
        continue;
      }

      for (variable, candidate) in collected {
        if let Err(e) = schema.validate(variable, &candidate.value) {
          tracing::warn!(method, document = %document.name, error = %e, "candidate rejected");
          report.rejected += 1;
          continue;
        }
        let outcome = self.store.push(&document.name, variable, candidate, method).await?;
        report.pushed += 1;
        if outcome.merged {
          report.merged += 1;
        }
      }
    }

    drop(loaded);
    tracing::info!(
      method,
      pushed = report.pushed,
      merged = report.merged,
      rejected = report.rejected,
      failed = report.failed,
      "labelling function finished"
    );
    Ok(report)
  }
}
