//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[source] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row could not be turned back into a history event.
  #[error("event {event_id} is undecodable: {message}")]
  Decode { event_id: i64, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised inside a connection closure travel back boxed in
/// [`tokio_rusqlite::Error::Other`]; unwrap them here.
impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Other(inner) => match inner.downcast::<Error>() {
        Ok(own) => *own,
        Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
      },
      other => Self::Database(other),
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self { Self::Database(err.into()) }
}

impl From<Error> for tokio_rusqlite::Error {
  fn from(err: Error) -> Self { Self::Other(Box::new(err)) }
}
