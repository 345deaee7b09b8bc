//! The `ChatStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `murmur-store-sqlite`).
//! Higher layers (`murmur-chat`, `murmur-api`) depend on this abstraction, not
//! on any concrete backend.

use std::{collections::BTreeSet, future::Future};

use uuid::Uuid;

use crate::{
  account::AccountId,
  message::{Appended, Message, MessageId, NewMessage},
  room::{Room, RoomActivity, RoomKind, ValidGroup},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`ChatStore::list_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
  /// Maximum number of messages returned.
  pub limit:  usize,
  /// Only return messages with an id strictly below this one.
  pub before: Option<MessageId>,
}

impl HistoryQuery {
  /// The newest page of a room.
  pub fn latest(limit: usize) -> Self { Self { limit, before: None } }

  /// The page immediately older than `before`.
  pub fn before(before: MessageId, limit: usize) -> Self {
    Self { limit, before: Some(before) }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Murmur storage backend: the durable Room Store and
/// Message Store.
///
/// Messages are append-only. Room membership only ever grows.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ChatStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Rooms ──────────────────────────────────────────────────────────────

  /// Create a DM room with members `{a, b}`, `a` recorded as creator.
  ///
  /// The existence check for the unordered pair runs in the same
  /// transaction as the insert; a DM that already exists is reported as a
  /// conflict, never duplicated.
  fn create_dm(
    &self,
    a: AccountId,
    b: AccountId,
  ) -> impl Future<Output = Result<Room, Self::Error>> + Send + '_;

  /// Create a group room with its initial members in one transaction.
  fn create_group(
    &self,
    group: ValidGroup,
  ) -> impl Future<Output = Result<Room, Self::Error>> + Send + '_;

  /// Fails with a not-found error if the room does not exist.
  fn get_room(
    &self,
    room_id: Uuid,
  ) -> impl Future<Output = Result<Room, Self::Error>> + Send + '_;

  /// The DM room between `a` and `b`, looked up by its unordered pair key.
  fn find_dm(
    &self,
    a: AccountId,
    b: AccountId,
  ) -> impl Future<Output = Result<Option<Room>, Self::Error>> + Send + '_;

  /// Add a member to a group room. Idempotent; DM rooms are rejected.
  fn add_member(
    &self,
    room_id: Uuid,
    account: AccountId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_members(
    &self,
    room_id: Uuid,
  ) -> impl Future<Output = Result<BTreeSet<AccountId>, Self::Error>> + Send + '_;

  fn is_member(
    &self,
    room_id: Uuid,
    account: AccountId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Every room `account` belongs to, optionally restricted to one kind,
  /// each with a pointer to its newest message. Order is unspecified.
  fn list_rooms(
    &self,
    account: AccountId,
    kind: Option<RoomKind>,
  ) -> impl Future<Output = Result<Vec<RoomActivity>, Self::Error>> + Send + '_;

  // ── Messages ───────────────────────────────────────────────────────────

  /// Persist a message. The sender's membership is checked in the same
  /// transaction as the insert. Timestamps never run behind id order.
  fn append(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<Appended, Self::Error>> + Send + '_;

  /// A page of history in ascending id order: the newest `limit` messages
  /// below `query.before` (or overall, if unset).
  fn list_history(
    &self,
    room_id: Uuid,
    query: HistoryQuery,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;

  fn last_message(
    &self,
    room_id: Uuid,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_;
}
