//! [`ChatService`]: persistence plus fan-out, behind membership checks.

use std::{collections::BTreeSet, sync::Arc};

use dashmap::DashMap;
use murmur_core::{
  Error, Result,
  account::{AccountDirectory, AccountId},
  message::{Appended, Message, NewMessage},
  room::{NewGroup, Room, RoomKind},
  store::{ChatStore, HistoryQuery},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
  broker::{Broker, DEFAULT_SUBSCRIBER_BUFFER, Subscription},
  directory::{self, MessageView},
  dm,
  resolver::{self, RoomSummary},
  store_err,
};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Tunables for the chat core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatConfig {
  /// Queue depth of each realtime subscription.
  pub subscriber_buffer: usize,
  /// Page size when a history request does not name one.
  pub history_default:   usize,
  /// Upper bound on any single history page.
  pub history_max:       usize,
}

impl Default for ChatConfig {
  fn default() -> Self {
    Self {
      subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
      history_default:   50,
      history_max:       200,
    }
  }
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Entry point for every chat operation.
///
/// Appends to one room are serialised so that id order, commit order and
/// delivery order agree; different rooms proceed independently.
pub struct ChatService<S, D> {
  store:     Arc<S>,
  directory: Arc<D>,
  broker:    Broker,
  gates:     DashMap<Uuid, Arc<Mutex<()>>>,
  config:    ChatConfig,
}

impl<S, D> ChatService<S, D>
where
  S: ChatStore,
  D: AccountDirectory,
{
  pub fn new(store: Arc<S>, directory: Arc<D>, config: ChatConfig) -> Self {
    Self {
      store,
      directory,
      broker: Broker::new(config.subscriber_buffer),
      gates: DashMap::new(),
      config,
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn directory(&self) -> &D { &self.directory }

  pub fn broker(&self) -> &Broker { &self.broker }

  pub fn config(&self) -> &ChatConfig { &self.config }

  // ── Membership ────────────────────────────────────────────────────────────

  pub async fn is_member(&self, room_id: Uuid, account: &AccountId) -> Result<bool> {
    self
      .store
      .is_member(room_id, account.clone())
      .await
      .map_err(store_err)
  }

  /// Load `room_id`, failing unless `account` belongs to it.
  async fn require_member(&self, room_id: Uuid, account: &AccountId) -> Result<Room> {
    let room = self.store.get_room(room_id).await.map_err(store_err)?;
    if !self.is_member(room_id, account).await? {
      return Err(Error::not_a_member(room_id, account));
    }
    Ok(room)
  }

  // ── Rooms ─────────────────────────────────────────────────────────────────

  pub async fn create_group(&self, group: NewGroup) -> Result<Room> {
    let room = self
      .store
      .create_group(group.validated()?)
      .await
      .map_err(store_err)?;
    tracing::info!(room_id = %room.room_id, creator = %room.created_by, "created group");
    Ok(room)
  }

  /// Add `account` to a group room on behalf of `actor`, who must already be
  /// a member.
  pub async fn add_member(
    &self,
    room_id: Uuid,
    actor: &AccountId,
    account: &AccountId,
  ) -> Result<()> {
    self.require_member(room_id, actor).await?;
    self
      .store
      .add_member(room_id, account.clone())
      .await
      .map_err(store_err)?;
    tracing::debug!(%room_id, %actor, %account, "added member");
    Ok(())
  }

  pub async fn get_room(&self, room_id: Uuid, viewer: &AccountId) -> Result<Room> {
    self.require_member(room_id, viewer).await
  }

  pub async fn list_members(
    &self,
    room_id: Uuid,
    viewer: &AccountId,
  ) -> Result<BTreeSet<AccountId>> {
    self.require_member(room_id, viewer).await?;
    self.store.list_members(room_id).await.map_err(store_err)
  }

  pub async fn get_or_create_dm(&self, a: &AccountId, b: &AccountId) -> Result<Room> {
    dm::get_or_create_dm(&*self.store, a, b).await
  }

  pub async fn list_rooms_for(
    &self,
    account: &AccountId,
    kind: Option<RoomKind>,
  ) -> Result<Vec<Room>> {
    resolver::list_rooms_for(&*self.store, account, kind).await
  }

  pub async fn list_room_summaries(
    &self,
    account: &AccountId,
    kind: Option<RoomKind>,
  ) -> Result<Vec<RoomSummary>> {
    resolver::list_room_summaries(&*self.store, account, kind).await
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  /// Persist a message and hand it to the room's live subscribers.
  ///
  /// A replayed idempotent append returns the original message and is not
  /// delivered again.
  pub async fn append(&self, input: NewMessage) -> Result<Appended> {
    let room_id = input.room_id;
    let gate = self.gates.entry(room_id).or_default().clone();

    let result = {
      let _turn = gate.lock().await;
      let appended = self.store.append(input).await.map_err(store_err);
      if let Ok(appended) = &appended
        && !appended.replayed
      {
        self.broker.publish(&appended.message);
      }
      appended
    };

    drop(gate);
    self
      .gates
      .remove_if(&room_id, |_, gate| Arc::strong_count(gate) == 1);

    let appended = result?;
    if appended.replayed {
      tracing::debug!(%room_id, id = %appended.message.message_id, "replayed idempotent append");
    } else {
      tracing::debug!(%room_id, id = %appended.message.message_id, "appended message");
    }
    Ok(appended)
  }

  /// A page of history, ascending by id. The page size is clamped to the
  /// configured maximum; `limit == 0` is an empty page.
  pub async fn history(
    &self,
    room_id: Uuid,
    reader: &AccountId,
    query: HistoryQuery,
  ) -> Result<Vec<Message>> {
    self.require_member(room_id, reader).await?;
    let query = HistoryQuery {
      limit: query.limit.min(self.config.history_max),
      ..query
    };
    self
      .store
      .list_history(room_id, query)
      .await
      .map_err(store_err)
  }

  /// [`Self::history`] with sender display data attached.
  pub async fn history_views(
    &self,
    room_id: Uuid,
    reader: &AccountId,
    query: HistoryQuery,
  ) -> Result<Vec<MessageView>> {
    let messages = self.history(room_id, reader, query).await?;
    Ok(directory::enrich(&*self.directory, messages).await)
  }

  /// Subscribe `account` to live deliveries on `room_id`.
  pub async fn subscribe(&self, room_id: Uuid, account: &AccountId) -> Result<Subscription> {
    self.require_member(room_id, account).await?;
    self.broker.subscribe(room_id)
  }

  /// Stop accepting subscriptions and end every live stream.
  pub fn shutdown(&self) { self.broker.shutdown(); }
}
