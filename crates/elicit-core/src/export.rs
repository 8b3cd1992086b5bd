//! CSV export of curator-validated values.
//!
//! One row per document, a `document_name` column followed by one column per
//! variable name. Each cell is a JSON array of the validated values (`[]`
//! when there are none), so multi-valued variables survive a spreadsheet
//! round-trip.

use std::io;

use crate::{Result, curation::DocumentRecord};

pub const DOCUMENT_COLUMN: &str = "document_name";

/// Write `records` as CSV with one column per entry of `variables`.
pub fn write_csv<W: io::Write>(
  writer: W,
  records: &[DocumentRecord],
  variables: &[String],
) -> Result<()> {
  let mut csv = csv::Writer::from_writer(writer);

  let mut header = Vec::with_capacity(variables.len() + 1);
  header.push(DOCUMENT_COLUMN);
  header.extend(variables.iter().map(String::as_str));
  csv.write_record(&header)?;

  for record in records {
    let mut row = Vec::with_capacity(variables.len() + 1);
    row.push(record.document_name.clone());
    for variable in variables {
      let values = record.values.get(variable).map(Vec::as_slice).unwrap_or(&[]);
      row.push(serde_json::to_string(values)?);
    }
    csv.write_record(&row)?;
  }

  csv.flush()?;
  Ok(())
}

pub fn to_csv(records: &[DocumentRecord], variables: &[String]) -> Result<String> {
  let mut buf = Vec::new();
  write_csv(&mut buf, records, variables)?;
  Ok(String::from_utf8_lossy(&buf).into_owned())
}
