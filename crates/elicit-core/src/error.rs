//! Error types for `elicit-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A categorical candidate named a value outside the declared levels.
  #[error("value {value:?} is not a declared category of variable {variable:?}")]
  SchemaViolation { variable: String, value: String },

  /// An estimator could not be fitted for a variable; the variable is skipped.
  #[error("insufficient training data for variable {variable:?}: {reason}")]
  InsufficientTrainingData { variable: String, reason: String },

  /// A uniqueness constraint fired on a write the merge logic should have
  /// turned into an update.
  #[error("deduplication invariant violated: {0}")]
  DedupInvariantViolation(String),

  /// A label model scored a different number of rows than it was given.
  #[error(
    "label model returned {actual} probabilities for {expected} rows of variable {variable:?}"
  )]
  LabelModelOutput {
    variable: String,
    expected: usize,
    actual:   usize,
  },

  /// A labelling function failed on a document.
  #[error("labelling function {method:?} failed on document {document:?}: {message}")]
  ExternalSourceFailure {
    method:   String,
    document: String,
    message:  String,
  },

  #[error("invalid schema: {0}")]
  InvalidSchema(String),

  #[error("toml error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("regex error: {0}")]
  Regex(#[from] regex::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether this error only means "skip this item and keep going".
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      Self::SchemaViolation { .. }
        | Self::InsufficientTrainingData { .. }
        | Self::ExternalSourceFailure { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
