//! Candidate evidence as proposed by labelling functions.
//!
//! Every candidate quotes the source text at three nested widths: the exact
//! span that produced the value, a local window around it, and a wider window
//! for human review. The deduplicator compares the exact and local windows.

use serde::{Deserialize, Serialize};

// ─── Evidence ────────────────────────────────────────────────────────────────

/// Three nested quotations of the same span; each is a superset of the
/// previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
  pub exact_context: String,
  pub local_context: String,
  pub wider_context: String,
}

impl Evidence {
  pub fn new(
    exact_context: impl Into<String>,
    local_context: impl Into<String>,
    wider_context: impl Into<String>,
  ) -> Self {
    Self {
      exact_context: exact_context.into(),
      local_context: local_context.into(),
      wider_context: wider_context.into(),
    }
  }

  /// Evidence whose three windows are the same quotation.
  pub fn quote(text: impl Into<String>) -> Self {
    let text = text.into();
    Self {
      exact_context: text.clone(),
      local_context: text.clone(),
      wider_context: text,
    }
  }

  /// Build the three windows around the byte span `start..end` of `text`.
  ///
  /// Offsets are clamped to the text and moved outwards to the nearest UTF-8
  /// character boundary. Narrowing and padding count characters: spans longer
  /// than `window.max_chars` keep their middle `max_chars` characters, then
  /// each window adds its padding in characters on either side.
  pub fn from_span(
    text: &str,
    start: usize,
    end: usize,
    window: &EvidenceWindow,
  ) -> Self {
    let end = ceil_char_boundary(text, end.min(text.len()));
    let start = floor_char_boundary(text, start.min(end));

    let span = &text[start..end];
    let chars = span.chars().count();
    let (start, end) = if chars > window.max_chars {
      let skip = (chars - window.max_chars) / 2;
      let offset =
        |n: usize| span.char_indices().nth(n).map_or(span.len(), |(i, _)| i);
      (start + offset(skip), start + offset(skip + window.max_chars))
    } else {
      (start, end)
    };

    Self {
      exact_context: slice_padded(text, start, end, 0),
      local_context: slice_padded(text, start, end, window.local_padding),
      wider_context: slice_padded(text, start, end, window.wider_padding),
    }
  }
}

/// `text[start..end]` widened by `padding` characters on each side.
fn slice_padded(text: &str, start: usize, end: usize, padding: usize) -> String {
  let lo = text[..start]
    .char_indices()
    .rev()
    .take(padding)
    .last()
    .map_or(start, |(i, _)| i);
  let hi = text[end..]
    .char_indices()
    .nth(padding)
    .map_or(text.len(), |(i, _)| end + i);
  text[lo..hi].to_owned()
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
  while !text.is_char_boundary(i) {
    i -= 1;
  }
  i
}

fn ceil_char_boundary(text: &str, mut i: usize) -> usize {
  while !text.is_char_boundary(i) {
    i += 1;
  }
  i
}

/// Padding applied around a matched span when quoting it.
///
/// The defaults are untuned; they are configuration, not part of the
/// deduplication contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceWindow {
  /// Characters added on each side for the local window.
  pub local_padding: usize,
  /// Characters added on each side for the wider window.
  pub wider_padding: usize,
  /// Exact spans longer than this many characters are narrowed around their
  /// midpoint.
  pub max_chars:     usize,
}

impl Default for EvidenceWindow {
  fn default() -> Self {
    Self { local_padding: 100, wider_padding: 500, max_chars: 100 }
  }
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// One vote from a labelling function: a value, how sure the method is, and
/// the text supporting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  pub value:      String,
  pub confidence: f64,
  #[serde(flatten)]
  pub evidence:   Evidence,
}

impl Candidate {
  pub fn new(
    value: impl Into<String>,
    confidence: f64,
    evidence: Evidence,
  ) -> Self {
    Self { value: value.into(), confidence, evidence }
  }
}
