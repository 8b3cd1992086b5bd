//! Error type for `elicit-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] elicit_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The `valid` column held something other than `'TRUE'`, `'FALSE'` or
  /// NULL.
  #[error("invalid value in extraction.valid: {0:?}")]
  InvalidValid(String),
}

impl Error {
  /// Database errors caused by a UNIQUE constraint mean the merge logic let a
  /// duplicate through; report them as such instead of as plain I/O failures.
  pub(crate) fn from_write(err: tokio_rusqlite::Error) -> Self {
    match &err {
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, msg))
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
      {
        Self::Core(elicit_core::Error::DedupInvariantViolation(
          msg.clone().unwrap_or_else(|| e.to_string()),
        ))
      }
      _ => Self::Database(err),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
