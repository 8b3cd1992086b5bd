//! [`SqliteStore`]: the SQLite implementation of [`EvidenceStore`].

use std::{path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, ToSql};

use elicit_core::{
  dedup::DedupPolicy,
  evidence::Candidate,
  record::{
    ConfidenceUpdate, Document, DocumentId, Explanation, ExtractionEvidence,
    ExtractionId, PushOutcome, RawExtraction, ValidatedExtraction, Variable,
    VariableEvidence, VariableId, VariableSnapshot,
  },
  schema::Schema,
  store::{EvidenceStore, ValidatedValue},
};

use crate::{
  Error, Result,
  encode::{
    DOCUMENT_COLUMNS, EXPLANATION_COLUMNS, EXTRACTION_COLUMNS, ExplanationRow,
    ExtractionRow, RAW_COLUMNS, VARIABLE_COLUMNS, document_at, encode_dt,
    encode_valid, raw_at, variable_at,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Elicit evidence store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection and schema are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  schema: Arc<Schema>,
  dedup:  DedupPolicy,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      schema: Arc::new(Schema::default()),
      dedup: DedupPolicy::default(),
    })
  }

  /// Validate pushes against `schema`. Without one, any value is accepted.
  pub fn with_schema(mut self, schema: Schema) -> Self {
    self.schema = Arc::new(schema);
    self
  }

  pub fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
    self.dedup = dedup;
    self
  }

  pub fn dedup(&self) -> DedupPolicy { self.dedup }

  fn validate(&self, document: &str, variable_name: &str, value: &str) -> Result<()> {
    self.schema.validate(variable_name, value).map_err(|e| {
      tracing::warn!(document, variable = variable_name, value, error = %e, "push rejected");
      Error::Core(e)
    })
  }
}

// ─── Connection-thread helpers ───────────────────────────────────────────────

fn get_or_create_document(
  conn: &rusqlite::Connection,
  name: &str,
) -> rusqlite::Result<DocumentId> {
  conn.execute(
    "INSERT OR IGNORE INTO document (document_name) VALUES (?1)",
    rusqlite::params![name],
  )?;
  conn.query_row(
    "SELECT document_id FROM document WHERE document_name = ?1",
    rusqlite::params![name],
    |r| r.get(0),
  )
}

fn get_or_create_variable(
  conn: &rusqlite::Connection,
  document_id: DocumentId,
  name: &str,
  value: &str,
) -> rusqlite::Result<VariableId> {
  conn.execute(
    "INSERT OR IGNORE INTO variable (document_id, variable_name, variable_value)
     VALUES (?1, ?2, ?3)",
    rusqlite::params![document_id, name, value],
  )?;
  conn.query_row(
    "SELECT variable_id FROM variable
     WHERE document_id = ?1 AND variable_name = ?2 AND variable_value = ?3",
    rusqlite::params![document_id, name, value],
    |r| r.get(0),
  )
}

/// Variables, extractions and raw extractions matching `filter`, a condition
/// over `d` (document) and `v` (variable). Each list is ordered by id.
fn read_evidence(
  conn: &rusqlite::Connection,
  filter: &str,
  params: &[&dyn ToSql],
) -> rusqlite::Result<(Vec<Variable>, Vec<ExtractionRow>, Vec<RawExtraction>)> {
  let variables = conn
    .prepare(&format!(
      "SELECT {VARIABLE_COLUMNS}
       FROM variable v
       JOIN document d ON d.document_id = v.document_id
       WHERE {filter}
       ORDER BY v.variable_id"
    ))?
    .query_map(params, |row| variable_at(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let extractions = conn
    .prepare(&format!(
      "SELECT {EXTRACTION_COLUMNS}
       FROM extraction e
       JOIN variable v ON v.variable_id = e.variable_id
       JOIN document d ON d.document_id = v.document_id
       WHERE {filter}
       ORDER BY e.extraction_id"
    ))?
    .query_map(params, |row| ExtractionRow::at(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let raw = conn
    .prepare(&format!(
      "SELECT {RAW_COLUMNS}
       FROM raw_extraction r
       JOIN extraction e ON e.extraction_id = r.extraction_id
       JOIN variable v ON v.variable_id = e.variable_id
       JOIN document d ON d.document_id = v.document_id
       WHERE {filter}
       ORDER BY r.raw_extraction_id"
    ))?
    .query_map(params, |row| raw_at(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok((variables, extractions, raw))
}

// ─── EvidenceStore impl ──────────────────────────────────────────────────────

impl EvidenceStore for SqliteStore {
  type Error = Error;

  fn schema(&self) -> &Schema { &self.schema }

  // ── Writes from labelling functions ───────────────────────────────────────

  async fn push_variable(
    &self,
    document: &str,
    variable_name: &str,
    value: &str,
  ) -> Result<VariableId> {
    self.validate(document, variable_name, value)?;

    let document = document.to_owned();
    let name = variable_name.to_owned();
    let value = value.to_owned();

    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let document_id = get_or_create_document(&tx, &document)?;
        let variable_id = get_or_create_variable(&tx, document_id, &name, &value)?;
        tx.commit()?;
        Ok(variable_id)
      })
      .await
      .map_err(Error::from_write)?;
    Ok(id)
  }

  async fn push(
    &self,
    document: &str,
    variable_name: &str,
    candidate: Candidate,
    method: &str,
  ) -> Result<PushOutcome> {
    self.validate(document, variable_name, &candidate.value)?;

    let document = document.to_owned();
    let name = variable_name.to_owned();
    let method = method.to_owned();
    let dedup = self.dedup;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let document_id = get_or_create_document(&tx, &document)?;
        let variable_id =
          get_or_create_variable(&tx, document_id, &name, &candidate.value)?;

        let existing: Vec<(ExtractionId, String, String)> = tx
          .prepare(
            "SELECT extraction_id, exact_context, local_context
             FROM extraction WHERE variable_id = ?1
             ORDER BY extraction_id",
          )?
          .query_map(rusqlite::params![variable_id], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
          })?
          .collect::<rusqlite::Result<_>>()?;

        let matched = dedup.find_match(
          existing.iter().map(|(id, exact, local)| (*id, exact.as_str(), local.as_str())),
          &candidate.evidence,
        );
        let (extraction_id, merged) = match matched {
          Some(id) => (id, true),
          None => {
            let ev = &candidate.evidence;
            tx.execute(
              "INSERT INTO extraction (variable_id, exact_context, local_context, wider_context)
               VALUES (?1, ?2, ?3, ?4)",
              rusqlite::params![
                variable_id,
                ev.exact_context,
                ev.local_context,
                ev.wider_context,
              ],
            )?;
            (tx.last_insert_rowid(), false)
          }
        };

        let prior: Option<(i64, f64)> = tx
          .query_row(
            "SELECT raw_extraction_id, confidence FROM raw_extraction
             WHERE extraction_id = ?1 AND method = ?2",
            rusqlite::params![extraction_id, method],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        let (raw_extraction_id, raw_updated) = match prior {
          Some((id, old)) => {
            if candidate.confidence > old {
              tx.execute(
                "UPDATE raw_extraction SET confidence = ?1 WHERE raw_extraction_id = ?2",
                rusqlite::params![candidate.confidence, id],
              )?;
            }
            (id, true)
          }
          None => {
            tx.execute(
              "INSERT INTO raw_extraction (extraction_id, method, confidence)
               VALUES (?1, ?2, ?3)",
              rusqlite::params![extraction_id, method, candidate.confidence],
            )?;
            (tx.last_insert_rowid(), false)
          }
        };

        tx.commit()?;
        Ok(PushOutcome {
          document_id,
          variable_id,
          extraction_id,
          raw_extraction_id,
          merged,
          raw_updated,
        })
      })
      .await
      .map_err(Error::from_write)?;

    tracing::debug!(
      document = outcome.document_id,
      variable = variable_name,
      extraction = outcome.extraction_id,
      merged = outcome.merged,
      raw_updated = outcome.raw_updated,
      "push"
    );
    Ok(outcome)
  }

  async fn prepare_documents(&self, documents: &[String]) -> Result<()> {
    let declared: Vec<(String, Vec<String>)> = self
      .schema
      .variables()
      .map(|(name, _)| (name.to_owned(), self.schema.declared_values(name)))
      .collect();
    let documents = documents.to_vec();
    let count = documents.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for document in &documents {
          let document_id = get_or_create_document(&tx, document)?;
          for (name, values) in &declared {
            for value in values {
              get_or_create_variable(&tx, document_id, name, value)?;
            }
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(Error::from_write)?;

    tracing::info!(documents = count, "prepared documents");
    Ok(())
  }

  // ── Training reads ────────────────────────────────────────────────────────

  async fn get_validated_document_names(
    &self,
    variable_name: &str,
    include_negatives: bool,
  ) -> Result<Vec<String>> {
    let name = variable_name.to_owned();
    let names = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT d.document_name
           FROM document d
           JOIN variable v   ON v.document_id = d.document_id
           JOIN extraction e ON e.variable_id = v.variable_id
           WHERE v.variable_name = ?1
             AND (e.valid = 'TRUE' OR (?2 AND e.valid = 'FALSE'))
           GROUP BY d.document_id
           ORDER BY d.document_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![name, include_negatives], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  async fn get_validated_extractions(
    &self,
    documents: &[String],
    variable_name: &str,
    include_negatives: bool,
  ) -> Result<Vec<ValidatedExtraction>> {
    let documents = documents.to_vec();
    let name = variable_name.to_owned();

    let rows: Vec<(String, Variable, ExtractionRow)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT d.document_name, {VARIABLE_COLUMNS}, {EXTRACTION_COLUMNS}
           FROM extraction e
           JOIN variable v ON v.variable_id = e.variable_id
           JOIN document d ON d.document_id = v.document_id
           WHERE v.variable_name = ?1
             AND (e.valid = 'TRUE' OR (?2 AND e.valid = 'FALSE'))
           ORDER BY e.extraction_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![name, include_negatives], |row| {
            Ok((row.get(0)?, variable_at(row, 1)?, ExtractionRow::at(row, 6)?))
          })?
          .filter(|r| r.as_ref().map_or(true, |(doc, ..)| documents.contains(doc)))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(document_name, variable, extraction)| {
        Ok(ValidatedExtraction {
          document_name,
          variable,
          extraction: extraction.into_extraction()?,
        })
      })
      .collect()
  }

  // ── General reads ─────────────────────────────────────────────────────────

  async fn list_documents(&self) -> Result<Vec<Document>> {
    let documents = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DOCUMENT_COLUMNS} FROM document d ORDER BY d.document_id"
        ))?;
        let rows = stmt
          .query_map([], |row| document_at(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(documents)
  }

  async fn list_variable_names(&self) -> Result<Vec<String>> {
    let names = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT variable_name FROM variable ORDER BY variable_name",
        )?;
        let rows = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  async fn get_variables(&self, document: &str) -> Result<Vec<Variable>> {
    let document = document.to_owned();
    let variables = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VARIABLE_COLUMNS}
           FROM variable v
           JOIN document d ON d.document_id = v.document_id
           WHERE d.document_name = ?1
           ORDER BY v.variable_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![document], |row| variable_at(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(variables)
  }

  async fn document_evidence(
    &self,
    document: &str,
    variable_name: &str,
  ) -> Result<Vec<VariableEvidence>> {
    let document = document.to_owned();
    let name = variable_name.to_owned();

    let (variables, extractions, raw) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let read = read_evidence(
          &tx,
          "d.document_name = ?1 AND v.variable_name = ?2",
          rusqlite::params![document, name],
        )?;
        tx.commit()?;
        Ok(read)
      })
      .await?;

    let mut evidence: Vec<VariableEvidence> = variables
      .into_iter()
      .map(|variable| VariableEvidence { variable, extractions: Vec::new() })
      .collect();
    let mut extractions: Vec<ExtractionEvidence> = extractions
      .into_iter()
      .map(|row| Ok(ExtractionEvidence { extraction: row.into_extraction()?, raw: Vec::new() }))
      .collect::<Result<_>>()?;

    for r in raw {
      if let Some(e) = extractions
        .iter_mut()
        .find(|e| e.extraction.extraction_id == r.extraction_id)
      {
        e.raw.push(r);
      }
    }
    for e in extractions {
      if let Some(v) = evidence
        .iter_mut()
        .find(|v| v.variable.variable_id == e.extraction.variable_id)
      {
        v.extractions.push(e);
      }
    }
    Ok(evidence)
  }

  async fn variable_snapshot(&self, variable_name: &str) -> Result<VariableSnapshot> {
    let name = variable_name.to_owned();

    let (variables, extractions, raw) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let read =
          read_evidence(&tx, "v.variable_name = ?1", rusqlite::params![name])?;
        tx.commit()?;
        Ok(read)
      })
      .await?;

    Ok(VariableSnapshot {
      variable_name: variable_name.to_owned(),
      variables,
      extractions: extractions
        .into_iter()
        .map(ExtractionRow::into_extraction)
        .collect::<Result<_>>()?,
      raw,
    })
  }

  async fn validated_values(&self) -> Result<Vec<ValidatedValue>> {
    let values = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT d.document_name, v.variable_name, v.variable_value
           FROM variable v
           JOIN document d ON d.document_id = v.document_id
           WHERE EXISTS (
             SELECT 1 FROM extraction e
             WHERE e.variable_id = v.variable_id AND e.valid = 'TRUE'
           )
           ORDER BY d.document_id, v.variable_id",
        )?;
        let rows = stmt
          .query_map([], |r| {
            Ok(ValidatedValue {
              document_name:  r.get(0)?,
              variable_name:  r.get(1)?,
              variable_value: r.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(values)
  }

  // ── Curation writes ───────────────────────────────────────────────────────

  async fn set_valid(
    &self,
    extraction_id: ExtractionId,
    valid: Option<bool>,
  ) -> Result<bool> {
    let encoded = encode_valid(valid);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE extraction SET valid = ?1 WHERE extraction_id = ?2",
          rusqlite::params![encoded, extraction_id],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn set_validated_context(
    &self,
    extraction_id: ExtractionId,
    text: String,
  ) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE extraction SET validated_context = ?1 WHERE extraction_id = ?2",
          rusqlite::params![text, extraction_id],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn record_explanation(
    &self,
    extraction_id: ExtractionId,
    text: String,
  ) -> Result<Option<Explanation>> {
    let recorded_at = Utc::now();
    let at_str = encode_dt(recorded_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM extraction WHERE extraction_id = ?1",
            rusqlite::params![extraction_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(None);
        }
        tx.execute(
          "INSERT INTO explanation (extraction_id, text, recorded_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![extraction_id, text, at_str],
        )?;
        let explanation_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some((explanation_id, text)))
      })
      .await?;

    Ok(inserted.map(|(explanation_id, text)| Explanation {
      explanation_id,
      extraction_id,
      text,
      recorded_at,
    }))
  }

  async fn get_explanations(&self, extraction_id: ExtractionId) -> Result<Vec<Explanation>> {
    let rows: Vec<ExplanationRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EXPLANATION_COLUMNS}
           FROM explanation x
           WHERE x.extraction_id = ?1
           ORDER BY x.explanation_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![extraction_id], |row| ExplanationRow::at(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(ExplanationRow::into_explanation).collect()
  }

  // ── Estimator writes ──────────────────────────────────────────────────────

  async fn write_confidences(&self, update: &ConfidenceUpdate) -> Result<()> {
    if update.is_empty() {
      return Ok(());
    }
    let values = update.value_confidence.clone();
    let meta = update.meta_confidence.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "UPDATE variable SET value_confidence = ?1 WHERE variable_id = ?2",
          )?;
          for (id, confidence) in &values {
            stmt.execute(rusqlite::params![confidence, id])?;
          }
          let mut stmt = tx.prepare(
            "UPDATE extraction SET meta_confidence = ?1 WHERE extraction_id = ?2",
          )?;
          for (id, confidence) in &meta {
            stmt.execute(rusqlite::params![confidence, id])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(
      variable = %update.variable_name,
      values = update.value_confidence.len(),
      extractions = update.meta_confidence.len(),
      "confidences written"
    );
    Ok(())
  }
}
