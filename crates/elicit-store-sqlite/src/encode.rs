//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. A curator's judgement is stored
//! as `'TRUE'`, `'FALSE'` or NULL.

use chrono::{DateTime, Utc};
use elicit_core::record::{
  Document, Explanation, Extraction, ExtractionId, RawExtraction, Variable,
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Valid ───────────────────────────────────────────────────────────────────

pub fn encode_valid(valid: Option<bool>) -> Option<&'static str> {
  valid.map(|v| if v { "TRUE" } else { "FALSE" })
}

pub fn decode_valid(s: Option<&str>) -> Result<Option<bool>> {
  match s {
    None => Ok(None),
    Some("TRUE") => Ok(Some(true)),
    Some("FALSE") => Ok(Some(false)),
    Some(other) => Err(Error::InvalidValid(other.to_owned())),
  }
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const DOCUMENT_COLUMNS: &str = "d.document_id, d.document_name";

pub const VARIABLE_COLUMNS: &str =
  "v.variable_id, v.document_id, v.variable_name, v.variable_value, v.value_confidence";

pub const EXTRACTION_COLUMNS: &str = "e.extraction_id, e.variable_id, e.exact_context, \
   e.local_context, e.wider_context, e.valid, e.meta_confidence, e.validated_context";

pub const RAW_COLUMNS: &str =
  "r.raw_extraction_id, r.extraction_id, r.method, r.confidence";

pub const EXPLANATION_COLUMNS: &str =
  "x.explanation_id, x.extraction_id, x.text, x.recorded_at";

// ─── Row types ───────────────────────────────────────────────────────────────
//
// Rows whose columns map one-to-one onto domain fields are read straight into
// the domain type; rows with encoded columns go through a `*Row` holding the
// raw strings, decoded outside the connection thread.

/// Read a [`Document`] from `DOCUMENT_COLUMNS` starting at `offset`.
pub fn document_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Document> {
  Ok(Document {
    document_id:   row.get(offset)?,
    document_name: row.get(offset + 1)?,
  })
}

/// Read a [`Variable`] from `VARIABLE_COLUMNS` starting at `offset`.
pub fn variable_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Variable> {
  Ok(Variable {
    variable_id:      row.get(offset)?,
    document_id:      row.get(offset + 1)?,
    variable_name:    row.get(offset + 2)?,
    variable_value:   row.get(offset + 3)?,
    value_confidence: row.get(offset + 4)?,
  })
}

/// Read a [`RawExtraction`] from `RAW_COLUMNS` starting at `offset`.
pub fn raw_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<RawExtraction> {
  Ok(RawExtraction {
    raw_extraction_id: row.get(offset)?,
    extraction_id:     row.get(offset + 1)?,
    method:            row.get(offset + 2)?,
    confidence:        row.get(offset + 3)?,
  })
}

/// Raw values read directly from an `extraction` row.
pub struct ExtractionRow {
  pub extraction_id:     ExtractionId,
  pub variable_id:       i64,
  pub exact_context:     String,
  pub local_context:     String,
  pub wider_context:     String,
  pub valid:             Option<String>,
  pub meta_confidence:   Option<f64>,
  pub validated_context: Option<String>,
}

impl ExtractionRow {
  /// Read from `EXTRACTION_COLUMNS` starting at `offset`.
  pub fn at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      extraction_id:     row.get(offset)?,
      variable_id:       row.get(offset + 1)?,
      exact_context:     row.get(offset + 2)?,
      local_context:     row.get(offset + 3)?,
      wider_context:     row.get(offset + 4)?,
      valid:             row.get(offset + 5)?,
      meta_confidence:   row.get(offset + 6)?,
      validated_context: row.get(offset + 7)?,
    })
  }

  pub fn into_extraction(self) -> Result<Extraction> {
    Ok(Extraction {
      extraction_id:     self.extraction_id,
      variable_id:       self.variable_id,
      exact_context:     self.exact_context,
      local_context:     self.local_context,
      wider_context:     self.wider_context,
      valid:             decode_valid(self.valid.as_deref())?,
      meta_confidence:   self.meta_confidence,
      validated_context: self.validated_context,
    })
  }
}

/// Raw values read directly from an `explanation` row.
pub struct ExplanationRow {
  pub explanation_id: i64,
  pub extraction_id:  ExtractionId,
  pub text:           String,
  pub recorded_at:    String,
}

impl ExplanationRow {
  pub fn at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      explanation_id: row.get(offset)?,
      extraction_id:  row.get(offset + 1)?,
      text:           row.get(offset + 2)?,
      recorded_at:    row.get(offset + 3)?,
    })
  }

  pub fn into_explanation(self) -> Result<Explanation> {
    Ok(Explanation {
      explanation_id: self.explanation_id,
      extraction_id:  self.extraction_id,
      text:           self.text,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn valid_round_trips_through_text() {
    for v in [None, Some(true), Some(false)] {
      assert_eq!(decode_valid(encode_valid(v)).unwrap(), v);
    }
    assert!(matches!(decode_valid(Some("yes")), Err(Error::InvalidValid(_))));
  }

  #[test]
  fn timestamps_are_rfc3339() {
    let now = Utc::now();
    assert_eq!(decode_dt(&encode_dt(now)).unwrap(), now);
    assert!(decode_dt("yesterday").is_err());
  }
}
