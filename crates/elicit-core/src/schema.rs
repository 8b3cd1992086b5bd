//! Schema registry types.
//!
//! A schema maps each variable name to the kind of value it holds. Schema
//! files are TOML tables whose values are either a list of admissible
//! categories or one of the literals `"continuous"` / `"raw"`:
//!
//! ```toml
//! offense = ["murder", "manslaughter"]
//! victim_age = "continuous"
//! judge_remarks = "raw"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sentinel value meaning "the method found nothing for this variable".
/// Always admissible, whatever the variable's kind.
pub const ABSTAIN: &str = "ABSTAIN";

// ─── VariableKind ────────────────────────────────────────────────────────────

/// The declared kind of a schema variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawKind", into = "RawKind")]
pub enum VariableKind {
  /// One of a fixed list of category strings.
  Categorical(Vec<String>),
  Continuous,
  /// Free text; no admissibility check.
  Raw,
}

impl VariableKind {
  /// Short name used by labelling functions to declare what they handle.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Categorical(_) => "categorical",
      Self::Continuous => "continuous",
      Self::Raw => "raw",
    }
  }
}

/// Wire form of [`VariableKind`]: a list, or a bare string literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawKind {
  Levels(Vec<String>),
  Named(String),
}

impl TryFrom<RawKind> for VariableKind {
  type Error = Error;

  fn try_from(raw: RawKind) -> Result<Self> {
    match raw {
      RawKind::Levels(levels) => {
        if levels.iter().any(|l| l == ABSTAIN) {
          return Err(Error::InvalidSchema(format!(
            "{ABSTAIN:?} is reserved and cannot be declared as a category"
          )));
        }
        Ok(Self::Categorical(levels))
      }
      RawKind::Named(name) => match name.as_str() {
        "continuous" => Ok(Self::Continuous),
        "raw" => Ok(Self::Raw),
        other => Err(Error::InvalidSchema(format!(
          "unknown variable kind {other:?}; expected a category list, \"continuous\" or \"raw\""
        ))),
      },
    }
  }
}

impl From<VariableKind> for RawKind {
  fn from(kind: VariableKind) -> Self {
    match kind {
      VariableKind::Categorical(levels) => Self::Levels(levels),
      VariableKind::Continuous => Self::Named("continuous".into()),
      VariableKind::Raw => Self::Named("raw".into()),
    }
  }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Variable name → declared kind, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
  variables: BTreeMap<String, VariableKind>,
}

impl Schema {
  pub fn new() -> Self { Self::default() }

  /// Parse a schema from the contents of a TOML file.
  pub fn from_toml_str(source: &str) -> Result<Self> {
    Ok(toml::from_str(source)?)
  }

  /// Builder-style insertion, mostly for tests and programmatic setup.
  pub fn with_variable(
    mut self,
    name: impl Into<String>,
    kind: VariableKind,
  ) -> Self {
    self.variables.insert(name.into(), kind);
    self
  }

  pub fn kind(&self, variable: &str) -> Option<&VariableKind> {
    self.variables.get(variable)
  }

  pub fn is_empty(&self) -> bool { self.variables.is_empty() }

  /// All declared variables in name order.
  pub fn variables(&self) -> impl Iterator<Item = (&str, &VariableKind)> {
    self.variables.iter().map(|(name, kind)| (name.as_str(), kind))
  }

  /// Check that `value` is admissible for `variable`.
  ///
  /// Undeclared variables and non-categorical kinds accept anything.
  pub fn validate(&self, variable: &str, value: &str) -> Result<()> {
    match self.kind(variable) {
      Some(VariableKind::Categorical(levels))
        if value != ABSTAIN && !levels.iter().any(|l| l == value) =>
      {
        Err(Error::SchemaViolation {
          variable: variable.to_owned(),
          value:    value.to_owned(),
        })
      }
      _ => Ok(()),
    }
  }

  /// The values pre-created for every document: the declared levels followed
  /// by [`ABSTAIN`]. Non-categorical variables only get [`ABSTAIN`].
  pub fn declared_values(&self, variable: &str) -> Vec<String> {
    let mut values = match self.kind(variable) {
      Some(VariableKind::Categorical(levels)) => levels.clone(),
      _ => Vec::new(),
    };
    values.push(ABSTAIN.to_owned());
    values
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCHEMA: &str = r#"
offense = ["murder", "manslaughter"]
victim_age = "continuous"
remarks = "raw"
"#;

  #[test]
  fn parses_all_kinds() {
    let schema = Schema::from_toml_str(SCHEMA).unwrap();
    assert_eq!(
      schema.kind("offense"),
      Some(&VariableKind::Categorical(vec![
        "murder".into(),
        "manslaughter".into()
      ]))
    );
    assert_eq!(schema.kind("victim_age"), Some(&VariableKind::Continuous));
    assert_eq!(schema.kind("remarks"), Some(&VariableKind::Raw));

    let names: Vec<_> = schema.variables().map(|(n, _)| n).collect();
    assert_eq!(names, ["offense", "remarks", "victim_age"]);
  }

  #[test]
  fn rejects_unknown_kind_literal() {
    let err = Schema::from_toml_str("x = \"ordinal\"").unwrap_err();
    assert!(err.to_string().contains("ordinal"));
  }

  #[test]
  fn rejects_reserved_category() {
    assert!(Schema::from_toml_str("x = [\"a\", \"ABSTAIN\"]").is_err());
  }

  #[test]
  fn validate_categorical() {
    let schema = Schema::from_toml_str(SCHEMA).unwrap();
    assert!(schema.validate("offense", "murder").is_ok());
    assert!(schema.validate("offense", ABSTAIN).is_ok());
    assert!(matches!(
      schema.validate("offense", "arson"),
      Err(Error::SchemaViolation { .. })
    ));
    assert!(schema.validate("victim_age", "42").is_ok());
    assert!(schema.validate("undeclared", "anything").is_ok());
  }

  #[test]
  fn declared_values_end_with_abstain() {
    let schema = Schema::from_toml_str(SCHEMA).unwrap();
    assert_eq!(
      schema.declared_values("offense"),
      ["murder", "manslaughter", ABSTAIN]
    );
    assert_eq!(schema.declared_values("remarks"), [ABSTAIN]);
  }
}
