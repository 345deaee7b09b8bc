//! Error type for `murmur-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain rule rejected the call (not found, forbidden, conflict, ...).
  #[error(transparent)]
  Core(#[from] murmur_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value in store: {value:?}")]
  UnknownVariant { column: &'static str, value: String },
}

impl From<Error> for murmur_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      Error::Database(db) => murmur_core::Error::Unavailable(db.to_string()),
      other => murmur_core::Error::Internal(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
