//! Error taxonomy shared by every Murmur crate.
//!
//! Backends and services translate their own failures into these variants
//! so callers (the HTTP layer in particular) can react on the kind alone.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A room or message does not exist.
  #[error("not found: {0}")]
  NotFound(String),

  /// The caller is not a member of the room it tried to read or write.
  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// The operation is not allowed for the target in its current state,
  /// e.g. adding a member to a DM room.
  #[error("invalid state: {0}")]
  InvalidState(String),

  /// A concurrent writer won a uniqueness race; re-read and retry.
  #[error("conflict: {0}")]
  Conflict(String),

  /// Storage or delivery is transiently unreachable; safe to retry.
  #[error("unavailable: {0}")]
  Unavailable(String),

  /// Stored data could not be interpreted; not retryable.
  #[error("internal error: {0}")]
  Internal(String),
}

impl Error {
  pub fn room_not_found(id: Uuid) -> Self {
    Self::NotFound(format!("room {id}"))
  }

  pub fn not_a_member(room_id: Uuid, account: impl std::fmt::Display) -> Self {
    Self::Forbidden(format!("{account} is not a member of room {room_id}"))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
