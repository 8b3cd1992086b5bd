//! Evidence deduplication.
//!
//! Several methods often quote the same fact with different window sizes, and
//! one method may quote overlapping spans of the same sentence. Before a push
//! inserts a new extraction, the store asks [`DedupPolicy::find_match`]
//! whether one of the variable's existing extractions already is that
//! evidence.
//!
//! The default containment rule treats two quotations as the same evidence
//! when either one's local window contains the other's exact span. It can
//! over-merge two facts whose windows happen to overlap and under-merge the
//! same fact quoted with disjoint padding, so it is configurable.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{evidence::Evidence, record::ExtractionId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
  /// `a.local ⊇ b.exact` or `b.local ⊇ a.exact`.
  #[default]
  Containment,
  /// Exact spans must be equal.
  Exact,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupPolicy {
  pub mode:                MatchMode,
  pub ignore_case:         bool,
  /// Treat any run of whitespace as a single space before comparing.
  pub collapse_whitespace: bool,
}

impl DedupPolicy {
  /// Decide whether two quotations are the same piece of evidence.
  ///
  /// An empty exact span only matches another empty exact span; otherwise
  /// evidence-less votes would absorb every other extraction.
  pub fn same_evidence(
    &self,
    existing_exact: &str,
    existing_local: &str,
    new: &Evidence,
  ) -> bool {
    let a_exact = self.normalize(existing_exact);
    let b_exact = self.normalize(&new.exact_context);

    if a_exact.is_empty() || b_exact.is_empty() {
      return a_exact.is_empty() && b_exact.is_empty();
    }

    match self.mode {
      MatchMode::Exact => a_exact == b_exact,
      MatchMode::Containment => {
        let a_local = self.normalize(existing_local);
        let b_local = self.normalize(&new.local_context);
        a_local.contains(b_exact.as_ref()) || b_local.contains(a_exact.as_ref())
      }
    }
  }

  /// The first (in iteration order) of `existing`, given as
  /// `(id, exact_context, local_context)`, that is the same evidence as
  /// `new`.
  pub fn find_match<'a, I>(&self, existing: I, new: &Evidence) -> Option<ExtractionId>
  where
    I: IntoIterator<Item = (ExtractionId, &'a str, &'a str)>,
  {
    existing
      .into_iter()
      .find(|&(_, exact, local)| self.same_evidence(exact, local, new))
      .map(|(id, ..)| id)
  }

  fn normalize<'s>(&self, s: &'s str) -> Cow<'s, str> {
    let mut out = Cow::Borrowed(s);
    if self.collapse_whitespace {
      out = Cow::Owned(s.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    if self.ignore_case {
      out = Cow::Owned(out.to_lowercase());
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Existing {
    id:            ExtractionId,
    exact_context: String,
    local_context: String,
  }

  impl Existing {
    fn row(&self) -> (ExtractionId, &str, &str) {
      (self.id, &self.exact_context, &self.local_context)
    }
  }

  fn extraction(id: ExtractionId, exact: &str, local: &str) -> Existing {
    Existing { id, exact_context: exact.into(), local_context: local.into() }
  }

  #[test]
  fn containment_is_symmetric_over_windows() {
    let policy = DedupPolicy::default();
    let existing = extraction(1, "pleaded guilty", "the defendant pleaded guilty");

    // New exact span inside existing local window.
    let inside = Evidence::new("defendant pleaded", "defendant pleaded", "");
    assert!(policy.same_evidence(&existing.exact_context, &existing.local_context, &inside));

    // Existing exact span inside new local window.
    let around = Evidence::new("murder", "pleaded guilty to murder", "");
    assert!(policy.same_evidence(&existing.exact_context, &existing.local_context, &around));
  }

  #[test]
  fn disjoint_quotes_do_not_match() {
    let policy = DedupPolicy::default();
    let existing = extraction(1, "murder", "convicted of murder");
    let other = Evidence::new("manslaughter", "acquitted of manslaughter", "");
    assert_eq!(policy.find_match([existing.row()], &other), None);
  }

  #[test]
  fn empty_exact_only_matches_empty() {
    let policy = DedupPolicy::default();
    let existing = extraction(1, "murder", "convicted of murder");
    let blank = Evidence::default();
    assert!(!policy.same_evidence(&existing.exact_context, &existing.local_context, &blank));

    let existing_blank = extraction(2, "", "");
    assert!(policy.same_evidence(&existing_blank.exact_context, &existing_blank.local_context, &blank));
  }

  #[test]
  fn exact_mode_ignores_windows() {
    let policy = DedupPolicy { mode: MatchMode::Exact, ..Default::default() };
    let existing = extraction(1, "murder", "convicted of murder");
    assert!(!policy.same_evidence(
      &existing.exact_context,
      &existing.local_context,
      &Evidence::new("of murder", "of murder", "")
    ));
    assert!(policy.same_evidence(
      &existing.exact_context,
      &existing.local_context,
      &Evidence::new("murder", "something else", "")
    ));
  }

  #[test]
  fn normalisation_options() {
    let policy = DedupPolicy {
      ignore_case: true,
      collapse_whitespace: true,
      ..Default::default()
    };
    let existing = extraction(1, "Pleaded  Guilty", "The defendant\npleaded  GUILTY");
    let new = Evidence::new("pleaded guilty", "pleaded guilty", "");
    assert!(policy.same_evidence(&existing.exact_context, &existing.local_context, &new));
    assert!(!DedupPolicy::default().same_evidence(
      &existing.exact_context,
      &existing.local_context,
      &new
    ));
  }

  #[test]
  fn first_match_wins() {
    let policy = DedupPolicy::default();
    let a = extraction(7, "guilty", "pleaded guilty");
    let b = extraction(9, "guilty", "found guilty");
    let new = Evidence::new("guilty", "guilty", "");
    assert_eq!(policy.find_match([a.row(), b.row()], &new), Some(7));
  }
}
