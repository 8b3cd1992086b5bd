//! Keyword matching: a categorical labelling function driven by per-category
//! keyword lists.
//!
//! The keyword file maps each variable to its categories and each category
//! to the phrases that indicate it:
//!
//! ```toml
//! [offense]
//! murder = ["murder", "murdered"]
//! manslaughter = ["manslaughter", "unlawful killing"]
//! ```
//!
//! Matching is case-insensitive and respects word boundaries; whitespace inside a
//! phrase matches any run of whitespace. Every match is one vote with
//! confidence 1.0.

use std::collections::BTreeMap;

use regex::Regex;

use super::{LabellingFunction, LoadedFunction};
use crate::{
  Result,
  evidence::{Candidate, Evidence, EvidenceWindow},
  schema::VariableKind,
};

/// Variable → category → phrases.
pub type KeywordSchema = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
  keywords: KeywordSchema,
  window:   EvidenceWindow,
}

impl KeywordMatch {
  pub const METHOD: &'static str = "keyword";

  pub fn new(keywords: KeywordSchema, window: EvidenceWindow) -> Self {
    Self { keywords, window }
  }

  pub fn from_toml_str(source: &str, window: EvidenceWindow) -> Result<Self> {
    Ok(Self::new(toml::from_str(source)?, window))
  }
}

impl LabellingFunction for KeywordMatch {
  type Loaded = LoadedKeywordMatch;

  fn method(&self) -> &str { Self::METHOD }

  fn handles(&self, kind: &VariableKind) -> bool {
    matches!(kind, VariableKind::Categorical(_))
  }

  fn load(&self) -> Result<LoadedKeywordMatch> {
    let mut patterns = BTreeMap::new();
    for (variable, categories) in &self.keywords {
      let mut compiled = Vec::new();
      for (category, phrases) in categories {
        if let Some(re) = phrase_pattern(phrases)? {
          compiled.push((category.clone(), re));
        }
      }
      patterns.insert(variable.clone(), compiled);
    }
    Ok(LoadedKeywordMatch { patterns, window: self.window })
  }
}

/// One case-insensitive alternation per category. Word boundaries are only
/// required at phrase ends that are word characters. `None` when the
/// category has no usable phrase.
fn phrase_pattern(phrases: &[String]) -> Result<Option<Regex>> {
  let alternatives: Vec<String> = phrases
    .iter()
    .map(|p| p.trim())
    .filter(|p| !p.is_empty())
    .map(|p| {
      let body = p
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
      let edge = |c: Option<char>| {
        if c.is_some_and(|c| c.is_alphanumeric() || c == '_') { r"\b" } else { "" }
      };
      format!("{}{body}{}", edge(p.chars().next()), edge(p.chars().last()))
    })
    .collect();
  if alternatives.is_empty() {
    return Ok(None);
  }
  let pattern = format!("(?i)(?:{})", alternatives.join("|"));
  Ok(Some(Regex::new(&pattern)?))
}

/// Compiled keyword patterns.
#[derive(Debug, Clone)]
pub struct LoadedKeywordMatch {
  patterns: BTreeMap<String, Vec<(String, Regex)>>,
  window:   EvidenceWindow,
}

impl LoadedFunction for LoadedKeywordMatch {
  fn extract(
    &self,
    _document: &str,
    variable: &str,
    _kind: &VariableKind,
    text: &str,
  ) -> Result<Vec<Candidate>> {
    let Some(categories) = self.patterns.get(variable) else {
      return Ok(Vec::new());
    };
    let mut candidates = Vec::new();
    for (category, re) in categories {
      for m in re.find_iter(text) {
        let evidence = Evidence::from_span(text, m.start(), m.end(), &self.window);
        candidates.push(Candidate::new(category.clone(), 1.0, evidence));
      }
    }
    Ok(candidates)
  }
}
