//! A reader's live view of one room.
//!
//! [`ChatSession`] keeps a local, id-ordered copy of a room's messages and
//! keeps it current from two sources: history pages and realtime deliveries.
//! Both feed the same merge, which is idempotent by message id, so the view
//! never holds a duplicate and never misses a message between loading history
//! and going live: the subscription is opened before the first history page
//! is read.
//!
//! ```text
//! Loading ──▶ Live ──▶ Resyncing ──▶ Live
//!                 ╲                ╱
//!                  ────▶ Closed ◀──
//! ```

use std::sync::Arc;

use murmur_core::{
  Error, Result,
  account::{AccountDirectory, AccountId},
  message::{Message, MessageKind, NewMessage},
  store::{ChatStore, HistoryQuery},
};
use uuid::Uuid;

use crate::{
  broker::{Delivery, Subscription},
  service::ChatService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  /// Subscribing and reading the first history page.
  Loading,
  Live,
  /// Realtime delivery was interrupted; history must be re-read before the
  /// view is trusted again.
  Resyncing,
  Closed,
}

/// What [`ChatSession::next_event`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  /// A message arrived live and was added to the view.
  Message(Message),
  /// The view was rebuilt from history after an interruption. `added` is how
  /// many messages were new to it.
  Resynced { added: usize },
}

pub struct ChatSession<S, D> {
  service:      Arc<ChatService<S, D>>,
  room_id:      Uuid,
  account:      AccountId,
  state:        SessionState,
  messages:     Vec<Message>,
  subscription: Option<Subscription>,
}

impl<S, D> ChatSession<S, D>
where
  S: ChatStore,
  D: AccountDirectory,
{
  /// Open a session on `room_id` as `account`, which must be a member.
  pub async fn open(
    service: Arc<ChatService<S, D>>,
    room_id: Uuid,
    account: AccountId,
  ) -> Result<Self> {
    let mut session = Self {
      service,
      room_id,
      account,
      state: SessionState::Loading,
      messages: Vec::new(),
      subscription: None,
    };

    session.subscription = Some(session.service.subscribe(room_id, &session.account).await?);
    let page = session.fetch(HistoryQuery::latest(session.page_size())).await?;
    session.merge_all(page);
    session.state = SessionState::Live;

    tracing::debug!(
      %room_id,
      account = %session.account,
      loaded = session.messages.len(),
      "chat session live"
    );
    Ok(session)
  }

  pub fn room_id(&self) -> Uuid { self.room_id }

  pub fn account(&self) -> &AccountId { &self.account }

  pub fn state(&self) -> SessionState { self.state }

  /// The local view, strictly ascending by id.
  pub fn messages(&self) -> &[Message] { &self.messages }

  fn page_size(&self) -> usize {
    let config = self.service.config();
    config.history_default.min(config.history_max).max(1)
  }

  fn ensure_open(&self) -> Result<()> {
    if self.state == SessionState::Closed {
      return Err(Error::InvalidState(format!(
        "chat session on room {} is closed",
        self.room_id
      )));
    }
    Ok(())
  }

  async fn fetch(&self, query: HistoryQuery) -> Result<Vec<Message>> {
    self.service.history(self.room_id, &self.account, query).await
  }

  // ── Merge ─────────────────────────────────────────────────────────────────

  /// Insert `message` in id order. Returns `false` if it was already present
  /// or belongs to another room.
  pub fn merge(&mut self, message: Message) -> bool {
    if message.room_id != self.room_id {
      tracing::warn!(
        room_id = %self.room_id,
        other = %message.room_id,
        "ignoring message for another room"
      );
      return false;
    }
    match self
      .messages
      .binary_search_by_key(&message.message_id, |m| m.message_id)
    {
      Ok(_) => false,
      Err(at) => {
        self.messages.insert(at, message);
        true
      }
    }
  }

  fn merge_all(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
    messages
      .into_iter()
      .map(|m| self.merge(m))
      .filter(|added| *added)
      .count()
  }

  // ── Sending ───────────────────────────────────────────────────────────────

  /// Send a message as this session's account.
  ///
  /// The view is not updated here; the message shows up through delivery
  /// like everyone else's.
  pub async fn send(&self, kind: MessageKind, payload: impl Into<String>) -> Result<Message> {
    self.ensure_open()?;
    let input = NewMessage::new(self.room_id, self.account.clone(), kind, payload);
    Ok(self.service.append(input).await?.message)
  }

  /// Like [`Self::send`], retry-safe under `key`.
  pub async fn send_idempotent(
    &self,
    kind: MessageKind,
    payload: impl Into<String>,
    key: impl Into<String>,
  ) -> Result<Message> {
    self.ensure_open()?;
    let input = NewMessage::new(self.room_id, self.account.clone(), kind, payload)
      .with_idempotency_key(key);
    Ok(self.service.append(input).await?.message)
  }

  // ── Receiving ─────────────────────────────────────────────────────────────

  /// Wait for the view to change.
  ///
  /// An interrupted subscription is repaired here: the session re-subscribes,
  /// re-reads history and reports [`SessionEvent::Resynced`]. Returns `None`
  /// once the session is closed.
  pub async fn next_event(&mut self) -> Result<Option<SessionEvent>> {
    loop {
      match self.state {
        SessionState::Closed => return Ok(None),
        // A repair that failed or was cancelled part way is finished before
        // anything live is trusted.
        SessionState::Resyncing => {
          let added = self.resync().await?;
          return Ok(Some(SessionEvent::Resynced { added }));
        }
        SessionState::Loading | SessionState::Live => {}
      }

      let delivery = match self.subscription.as_mut() {
        Some(subscription) => subscription.recv().await,
        None => None,
      };

      match delivery {
        Some(Delivery::Message(message)) => {
          if self.merge(message.clone()) {
            return Ok(Some(SessionEvent::Message(message)));
          }
        }
        Some(Delivery::Resync) | None => {
          let added = self.resync().await?;
          return Ok(Some(SessionEvent::Resynced { added }));
        }
      }
    }
  }

  /// Drop the realtime connection without closing the session. The next
  /// [`Self::next_event`] or [`Self::resync`] reconnects.
  pub fn disconnect(&mut self) {
    if self.state == SessionState::Closed {
      return;
    }
    self.subscription = None;
    self.state = SessionState::Resyncing;
    tracing::debug!(room_id = %self.room_id, "chat session disconnected");
  }

  /// Re-subscribe, then read history back to the newest message already in
  /// the view, merging everything found. Returns the number of messages new
  /// to the view.
  pub async fn resync(&mut self) -> Result<usize> {
    self.ensure_open()?;
    self.state = SessionState::Resyncing;
    self.subscription = None;

    self.subscription = Some(self.service.subscribe(self.room_id, &self.account).await?);

    match self.catch_up().await {
      Ok(added) => {
        self.state = SessionState::Live;
        tracing::debug!(room_id = %self.room_id, added, "chat session resynced");
        Ok(added)
      }
      Err(e) => {
        // Still Resyncing: the next attempt re-subscribes and re-reads.
        self.subscription = None;
        tracing::warn!(room_id = %self.room_id, "chat session resync failed: {e}");
        Err(e)
      }
    }
  }

  /// Read history backwards from the newest page until it overlaps the view.
  async fn catch_up(&mut self) -> Result<usize> {
    let known = self.messages.last().map(|m| m.message_id);
    let page_size = self.page_size();
    let mut before = None;
    let mut added = 0;

    loop {
      let page = self.fetch(HistoryQuery { limit: page_size, before }).await?;
      let full = page.len() >= page_size;
      let oldest = page.first().map(|m| m.message_id);
      added += self.merge_all(page);

      match (oldest, known) {
        (Some(oldest), Some(known)) if full && oldest > known => before = Some(oldest),
        _ => return Ok(added),
      }
    }
  }

  /// Extend the view backwards by up to `limit` messages. Returns how many
  /// were added; zero means the start of the room was reached.
  pub async fn load_older(&mut self, limit: usize) -> Result<usize> {
    self.ensure_open()?;
    let query = match self.messages.first() {
      Some(oldest) => HistoryQuery::before(oldest.message_id, limit),
      None => HistoryQuery::latest(limit),
    };
    let page = self.fetch(query).await?;
    Ok(self.merge_all(page))
  }

  /// Unsubscribe and discard any undelivered messages. Idempotent.
  pub fn close(&mut self) {
    if let Some(subscription) = self.subscription.take() {
      self.service.broker().unsubscribe(subscription.token());
    }
    if self.state != SessionState::Closed {
      tracing::debug!(room_id = %self.room_id, "chat session closed");
    }
    self.state = SessionState::Closed;
  }
}
