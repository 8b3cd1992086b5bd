//! Agreement: confidence-weighted voting across methods.
//!
//! For each (document, variable) the methods' confidences are summed per
//! candidate value; the value with the largest sum wins, ties going to the
//! value seen first. A method that voted for one value through several
//! extractions contributes its strongest vote once.
//!
//! The agreement score `k/N` counts the non-manual methods that voted at all
//! (`N`) and those among them whose own top vote is the winning value (`k`).

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use serde::{Deserialize, Serialize};

use crate::record::{
  ConfidenceUpdate, DocumentId, ExtractionId, MANUAL_METHOD, RawExtraction,
  Variable, VariableId, VariableSnapshot,
};

// ─── Score ───────────────────────────────────────────────────────────────────

/// `agreeing` out of `voters` methods back a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgreementScore {
  pub agreeing: usize,
  pub voters:   usize,
}

impl AgreementScore {
  /// The score as a fraction; `0.0` when nobody voted.
  pub fn ratio(&self) -> f64 {
    if self.voters == 0 {
      0.0
    } else {
      self.agreeing as f64 / self.voters as f64
    }
  }
}

impl fmt::Display for AgreementScore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.agreeing, self.voters)
  }
}

// ─── Tally ───────────────────────────────────────────────────────────────────

/// Votes for one candidate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTally {
  pub variable_id:    VariableId,
  pub variable_value: String,
  /// Sum over methods of each method's strongest vote for this value.
  pub total:          f64,
  /// Share of the (document, variable) total; `0.0` when nothing was voted.
  pub share:          f64,
  /// How many voting methods rank this value first.
  pub score:          AgreementScore,
}

/// The outcome of voting for one (document, variable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
  pub document_id:   DocumentId,
  pub variable_name: String,
  /// `None` when no method cast a non-zero vote.
  pub winner:        Option<VariableId>,
  /// Score of the winning value (`0/N` without a winner).
  pub score:         AgreementScore,
  /// One tally per candidate value, in variable-id order.
  pub tallies:       Vec<ValueTally>,
}

impl Agreement {
  pub fn tally_for(&self, variable_id: VariableId) -> Option<&ValueTally> {
    self.tallies.iter().find(|t| t.variable_id == variable_id)
  }

  pub fn winning_value(&self) -> Option<&str> {
    let winner = self.winner?;
    self.tally_for(winner).map(|t| t.variable_value.as_str())
  }
}

/// Vote over the candidate values of one (document, variable).
///
/// `variables` must all belong to the same document and variable name and be
/// ordered by id; `votes` maps each variable id to its raw votes.
pub fn vote<'a>(
  variables: &[&Variable],
  votes: &BTreeMap<VariableId, Vec<&'a RawExtraction>>,
) -> Option<Agreement> {
  let first = variables.first()?;

  // method → (variable index → strongest vote)
  let mut by_method: BTreeMap<&str, BTreeMap<usize, f64>> = BTreeMap::new();
  for (idx, variable) in variables.iter().enumerate() {
    for raw in votes.get(&variable.variable_id).into_iter().flatten() {
      if raw.confidence <= 0.0 {
        continue;
      }
      let best = by_method
        .entry(raw.method.as_str())
        .or_default()
        .entry(idx)
        .or_insert(0.0);
      *best = best.max(raw.confidence);
    }
  }

  let mut totals = vec![0.0_f64; variables.len()];
  for per_value in by_method.values() {
    for (&idx, &confidence) in per_value {
      totals[idx] += confidence;
    }
  }
  let grand_total: f64 = totals.iter().sum();

  let mut winner: Option<usize> = None;
  for (idx, &total) in totals.iter().enumerate() {
    if total > 0.0 && winner.is_none_or(|w| total > totals[w]) {
      winner = Some(idx);
    }
  }

  // Top-ranked value indices for each non-manual method.
  let voters: Vec<BTreeSet<usize>> = by_method
    .iter()
    .filter(|(method, _)| **method != MANUAL_METHOD)
    .map(|(_, per_value)| {
      let top = per_value.values().copied().fold(0.0_f64, f64::max);
      per_value
        .iter()
        .filter(|&(_, &c)| c == top)
        .map(|(&idx, _)| idx)
        .collect()
    })
    .collect();

  let score_of = |idx: usize| AgreementScore {
    agreeing: voters.iter().filter(|top| top.contains(&idx)).count(),
    voters:   voters.len(),
  };

  let tallies = variables
    .iter()
    .enumerate()
    .map(|(idx, variable)| ValueTally {
      variable_id:    variable.variable_id,
      variable_value: variable.variable_value.clone(),
      total:          totals[idx],
      share:          if grand_total > 0.0 { totals[idx] / grand_total } else { 0.0 },
      score:          score_of(idx),
    })
    .collect();

  Some(Agreement {
    document_id: first.document_id,
    variable_name: first.variable_name.clone(),
    winner: winner.map(|idx| variables[idx].variable_id),
    score: match winner {
      Some(idx) => score_of(idx),
      None => AgreementScore { agreeing: 0, voters: voters.len() },
    },
    tallies,
  })
}

/// Vote over every document in a snapshot, in document-id order.
pub fn agreements(snapshot: &VariableSnapshot) -> Vec<Agreement> {
  let owner: BTreeMap<ExtractionId, VariableId> = snapshot
    .extractions
    .iter()
    .map(|e| (e.extraction_id, e.variable_id))
    .collect();

  let mut votes: BTreeMap<VariableId, Vec<&RawExtraction>> = BTreeMap::new();
  for raw in &snapshot.raw {
    if let Some(&variable_id) = owner.get(&raw.extraction_id) {
      votes.entry(variable_id).or_default().push(raw);
    }
  }

  let mut by_document: BTreeMap<DocumentId, Vec<&Variable>> = BTreeMap::new();
  for variable in &snapshot.variables {
    by_document.entry(variable.document_id).or_default().push(variable);
  }

  by_document
    .values()
    .filter_map(|variables| vote(variables, &votes))
    .collect()
}

/// Agreement policy: each value's confidence is its share of the vote.
pub fn estimate(snapshot: &VariableSnapshot) -> ConfidenceUpdate {
  let value_confidence = agreements(snapshot)
    .into_iter()
    .flat_map(|a| a.tallies.into_iter().map(|t| (t.variable_id, t.share)))
    .collect();

  ConfidenceUpdate {
    variable_name: snapshot.variable_name.clone(),
    value_confidence,
    meta_confidence: Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::Extraction;

  struct Builder {
    snapshot: VariableSnapshot,
  }

  impl Builder {
    fn new() -> Self {
      Self {
        snapshot: VariableSnapshot {
          variable_name: "offense".into(),
          ..Default::default()
        },
      }
    }

    fn value(&mut self, document_id: DocumentId, value: &str) -> VariableId {
      let id = self.snapshot.variables.len() as i64 + 1;
      self.snapshot.variables.push(Variable {
        variable_id:      id,
        document_id,
        variable_name:    "offense".into(),
        variable_value:   value.into(),
        value_confidence: None,
      });
      id
    }

    fn vote(&mut self, variable_id: VariableId, method: &str, confidence: f64) {
      let extraction_id = self.snapshot.extractions.len() as i64 + 1;
      self.snapshot.extractions.push(Extraction {
        extraction_id,
        variable_id,
        exact_context: format!("quote {extraction_id}"),
        local_context: String::new(),
        wider_context: String::new(),
        valid: None,
        meta_confidence: None,
        validated_context: None,
      });
      self.snapshot.raw.push(RawExtraction {
        raw_extraction_id: self.snapshot.raw.len() as i64 + 1,
        extraction_id,
        method: method.into(),
        confidence,
      });
    }
  }

  #[test]
  fn unanimous_vote() {
    let mut b = Builder::new();
    let murder = b.value(1, "murder");
    b.value(1, "manslaughter");
    b.vote(murder, "keyword", 1.0);
    b.vote(murder, "qa", 0.6);

    let result = agreements(&b.snapshot);
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].winner, Some(murder));
    assert_eq!(result[0].score.to_string(), "2/2");
    assert_eq!(result[0].winning_value(), Some("murder"));
  }

  #[test]
  fn confidence_mass_decides_the_winner() {
    let mut b = Builder::new();
    let murder = b.value(1, "murder");
    let manslaughter = b.value(1, "manslaughter");
    b.vote(murder, "keyword", 0.3);
    b.vote(manslaughter, "qa", 0.5);
    b.vote(manslaughter, "nli", 0.4);

    let a = &agreements(&b.snapshot)[0];
    assert_eq!(a.winner, Some(manslaughter));
    assert_eq!(a.score, AgreementScore { agreeing: 2, voters: 3 });
    assert_eq!(a.tally_for(murder).unwrap().score.to_string(), "1/3");
  }

  #[test]
  fn ties_go_to_first_seen_value() {
    let mut b = Builder::new();
    let first = b.value(1, "murder");
    let second = b.value(1, "manslaughter");
    b.vote(second, "qa", 0.5);
    b.vote(first, "keyword", 0.5);

    assert_eq!(agreements(&b.snapshot)[0].winner, Some(first));
  }

  #[test]
  fn repeated_votes_by_one_method_count_once() {
    let mut b = Builder::new();
    let murder = b.value(1, "murder");
    let manslaughter = b.value(1, "manslaughter");
    b.vote(murder, "keyword", 0.4);
    b.vote(murder, "keyword", 0.4);
    b.vote(murder, "keyword", 0.4);
    b.vote(manslaughter, "qa", 0.9);

    let a = &agreements(&b.snapshot)[0];
    assert_eq!(a.winner, Some(manslaughter));
    assert!((a.tally_for(murder).unwrap().total - 0.4).abs() < 1e-12);
  }

  #[test]
  fn manual_votes_weigh_in_but_are_not_counted() {
    let mut b = Builder::new();
    let murder = b.value(1, "murder");
    let manslaughter = b.value(1, "manslaughter");
    b.vote(murder, MANUAL_METHOD, 1.0);
    b.vote(manslaughter, "qa", 0.5);

    let a = &agreements(&b.snapshot)[0];
    assert_eq!(a.winner, Some(murder));
    assert_eq!(a.score.to_string(), "0/1");
  }

  #[test]
  fn no_votes_means_no_winner() {
    let mut b = Builder::new();
    let murder = b.value(1, "murder");
    b.vote(murder, "keyword", 0.0);

    let a = &agreements(&b.snapshot)[0];
    assert_eq!(a.winner, None);
    assert_eq!(a.score.to_string(), "0/0");
    assert_eq!(a.tallies[0].share, 0.0);
  }

  #[test]
  fn supporting_the_winner_never_lowers_its_score() {
    let mut b = Builder::new();
    let murder = b.value(1, "murder");
    let manslaughter = b.value(1, "manslaughter");
    b.vote(murder, "keyword", 0.7);
    b.vote(manslaughter, "qa", 0.6);
    b.vote(manslaughter, "nli", 0.05);

    let before = agreements(&b.snapshot)[0].clone();
    assert_eq!(before.winner, Some(murder));

    for (method, confidence) in [("nli", 0.1), ("nli", 0.9), ("similarity", 0.3), ("qa", 0.8)] {
      let prev = agreements(&b.snapshot)[0].score.ratio();
      b.vote(murder, method, confidence);
      let after = agreements(&b.snapshot)[0].clone();
      assert_eq!(after.winner, Some(murder));
      assert!(after.score.ratio() >= prev, "{method} lowered the score");
    }
  }

  #[test]
  fn estimate_writes_vote_shares_for_every_document() {
    let mut b = Builder::new();
    let d1_murder = b.value(1, "murder");
    let d1_abstain = b.value(1, "ABSTAIN");
    let d2_murder = b.value(2, "murder");
    b.vote(d1_murder, "keyword", 0.75);
    b.vote(d1_abstain, "qa", 0.25);

    let update = estimate(&b.snapshot);
    assert_eq!(
      update.value_confidence,
      vec![(d1_murder, 0.75), (d1_abstain, 0.25), (d2_murder, 0.0)]
    );
    assert!(update.meta_confidence.is_empty());
  }
}
