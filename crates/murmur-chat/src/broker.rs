//! In-process fan-out of appended messages to live room subscribers.
//!
//! Every subscription owns a bounded queue. Publishing never blocks and never
//! fails: a subscriber whose queue is full is evicted and told to resync from
//! history, and a subscriber whose receiver is gone is pruned silently.

use std::{
  collections::HashMap,
  fmt,
  sync::{
    Arc, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
};

use dashmap::DashMap;
use murmur_core::{
  Error, Result,
  message::{Message, MessageId},
};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Queue depth per subscription unless configured otherwise.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

// ─── Public types ────────────────────────────────────────────────────────────

/// Identifies one subscription for [`Broker::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

impl fmt::Display for SubscriptionToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "sub-{}", self.0)
  }
}

/// What a subscriber observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
  Message(Message),
  /// The subscriber fell behind and was dropped; deliveries may be missing.
  /// Reload from history and subscribe again.
  Resync,
}

// ─── Broker ──────────────────────────────────────────────────────────────────

struct Subscriber {
  tx:        mpsc::Sender<Message>,
  lagged:    Arc<AtomicBool>,
  last_sent: Option<MessageId>,
}

struct Inner {
  rooms:      DashMap<Uuid, HashMap<SubscriptionToken, Subscriber>>,
  tokens:     DashMap<SubscriptionToken, Uuid>,
  next_token: AtomicU64,
  buffer:     usize,
  closed:     AtomicBool,
}

impl Inner {
  fn remove(&self, token: SubscriptionToken) -> bool {
    let Some((_, room_id)) = self.tokens.remove(&token) else {
      return false;
    };
    self.detach(room_id, token);
    true
  }

  fn detach(&self, room_id: Uuid, token: SubscriptionToken) {
    if let Some(mut subs) = self.rooms.get_mut(&room_id) {
      subs.remove(&token);
    }
    self.rooms.remove_if(&room_id, |_, subs| subs.is_empty());
  }
}

/// Room-keyed publish/subscribe hub. Cloning yields another handle to the
/// same registry.
#[derive(Clone)]
pub struct Broker {
  inner: Arc<Inner>,
}

impl Default for Broker {
  fn default() -> Self { Self::new(DEFAULT_SUBSCRIBER_BUFFER) }
}

impl Broker {
  /// `buffer` is the per-subscription queue depth; zero is treated as one.
  pub fn new(buffer: usize) -> Self {
    Self {
      inner: Arc::new(Inner {
        rooms:      DashMap::new(),
        tokens:     DashMap::new(),
        next_token: AtomicU64::new(1),
        buffer:     buffer.max(1),
        closed:     AtomicBool::new(false),
      }),
    }
  }

  /// Register interest in `room_id`. Messages published after this returns
  /// are delivered to the subscription in id order.
  ///
  /// Room existence and membership are the caller's concern.
  pub fn subscribe(&self, room_id: Uuid) -> Result<Subscription> {
    if self.inner.closed.load(Ordering::SeqCst) {
      return Err(shut_down());
    }

    let token = SubscriptionToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = mpsc::channel(self.inner.buffer);
    let lagged = Arc::new(AtomicBool::new(false));

    self.inner.tokens.insert(token, room_id);
    self.inner.rooms.entry(room_id).or_default().insert(token, Subscriber {
      tx,
      lagged: lagged.clone(),
      last_sent: None,
    });

    // A shutdown that cleared the registry between the check above and the
    // insert would otherwise leave this entry behind.
    if self.inner.closed.load(Ordering::SeqCst) {
      self.inner.tokens.remove(&token);
      self.inner.detach(room_id, token);
      return Err(shut_down());
    }

    tracing::debug!(%room_id, %token, "subscribed");

    Ok(Subscription {
      token,
      room_id,
      rx,
      lagged,
      broker: Arc::downgrade(&self.inner),
    })
  }

  /// Stop delivering to `token`. Unknown or already-removed tokens are a
  /// no-op.
  pub fn unsubscribe(&self, token: SubscriptionToken) {
    if self.inner.remove(token) {
      tracing::debug!(%token, "unsubscribed");
    }
  }

  /// Offer `message` to every current subscriber of its room.
  ///
  /// Callers must publish a room's messages in id order; an id at or below
  /// what a subscriber has already been sent is skipped for that subscriber.
  pub fn publish(&self, message: &Message) {
    let room_id = message.room_id;
    let id = message.message_id;
    let mut dropped = Vec::new();

    let Some(mut subs) = self.inner.rooms.get_mut(&room_id) else {
      tracing::trace!(%room_id, %id, "no subscribers");
      return;
    };

    subs.retain(|token, sub| {
      if sub.last_sent.is_some_and(|last| id <= last) {
        tracing::debug!(%room_id, %token, %id, "skipping out-of-order delivery");
        return true;
      }
      match sub.tx.try_send(message.clone()) {
        Ok(()) => {
          sub.last_sent = Some(id);
          true
        }
        Err(TrySendError::Full(_)) => {
          tracing::warn!(%room_id, %token, "subscriber queue full; forcing resync");
          sub.lagged.store(true, Ordering::Release);
          dropped.push(*token);
          false
        }
        Err(TrySendError::Closed(_)) => {
          tracing::debug!(%room_id, %token, "pruning closed subscriber");
          dropped.push(*token);
          false
        }
      }
    });
    drop(subs);

    if !dropped.is_empty() {
      for token in dropped {
        self.inner.tokens.remove(&token);
      }
      self.inner.rooms.remove_if(&room_id, |_, subs| subs.is_empty());
    }
  }

  /// Number of live subscriptions on `room_id`.
  pub fn subscriber_count(&self, room_id: Uuid) -> usize {
    self.inner.rooms.get(&room_id).map_or(0, |subs| subs.len())
  }

  /// Drop every subscription and refuse new ones. Pending receivers drain
  /// their queues and then observe the end of the stream.
  pub fn shutdown(&self) {
    self.inner.closed.store(true, Ordering::SeqCst);
    self.inner.rooms.clear();
    self.inner.tokens.clear();
    tracing::info!("delivery broker shut down");
  }

  pub fn is_shut_down(&self) -> bool { self.inner.closed.load(Ordering::Acquire) }
}

fn shut_down() -> Error { Error::Unavailable("delivery broker is shut down".into()) }

// ─── Subscription ────────────────────────────────────────────────────────────

/// Receiving half of a subscription. Dropping it unsubscribes.
pub struct Subscription {
  token:   SubscriptionToken,
  room_id: Uuid,
  rx:      mpsc::Receiver<Message>,
  lagged:  Arc<AtomicBool>,
  broker:  Weak<Inner>,
}

impl Subscription {
  pub fn token(&self) -> SubscriptionToken { self.token }

  pub fn room_id(&self) -> Uuid { self.room_id }

  /// Wait for the next delivery.
  ///
  /// Returns [`Delivery::Resync`] once after the subscription was evicted for
  /// falling behind, and `None` when the subscription has ended. Cancel-safe.
  pub async fn recv(&mut self) -> Option<Delivery> {
    match self.rx.recv().await {
      Some(message) => Some(Delivery::Message(message)),
      None if self.lagged.swap(false, Ordering::AcqRel) => Some(Delivery::Resync),
      None => None,
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(inner) = self.broker.upgrade() {
      inner.remove(self.token);
    }
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("token", &self.token)
      .field("room_id", &self.room_id)
      .finish_non_exhaustive()
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use murmur_core::{account::AccountId, message::MessageKind};

  use super::*;

  fn msg(room_id: Uuid, id: i64) -> Message {
    Message {
      message_id: MessageId::new(id),
      room_id,
      sender_id: AccountId::new("alice"),
      kind: MessageKind::Text,
      payload: format!("m{id}"),
      created_at: Utc::now(),
    }
  }

  fn id_of(delivery: Option<Delivery>) -> i64 {
    match delivery {
      Some(Delivery::Message(m)) => m.message_id.get(),
      other => panic!("expected a message, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn delivers_in_publish_order() {
    let broker = Broker::default();
    let room = Uuid::new_v4();
    let mut sub = broker.subscribe(room).unwrap();

    for id in 1..=3 {
      broker.publish(&msg(room, id));
    }

    assert_eq!(id_of(sub.recv().await), 1);
    assert_eq!(id_of(sub.recv().await), 2);
    assert_eq!(id_of(sub.recv().await), 3);
  }

  #[tokio::test]
  async fn only_the_published_room_is_notified() {
    let broker = Broker::default();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut sub_a = broker.subscribe(a).unwrap();
    let mut sub_b = broker.subscribe(b).unwrap();

    broker.publish(&msg(b, 7));

    assert_eq!(id_of(sub_b.recv().await), 7);
    assert!(sub_a.rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn publish_without_subscribers_is_a_no_op() {
    let broker = Broker::default();
    broker.publish(&msg(Uuid::new_v4(), 1));
  }

  #[tokio::test]
  async fn unsubscribe_is_idempotent() {
    let broker = Broker::default();
    let room = Uuid::new_v4();
    let mut sub = broker.subscribe(room).unwrap();
    let token = sub.token();

    broker.unsubscribe(token);
    broker.unsubscribe(token);
    assert_eq!(broker.subscriber_count(room), 0);

    broker.publish(&msg(room, 1));
    assert!(sub.recv().await.is_none());
  }

  #[tokio::test]
  async fn dropping_a_subscription_unsubscribes() {
    let broker = Broker::default();
    let room = Uuid::new_v4();
    let first = broker.subscribe(room).unwrap();
    let _second = broker.subscribe(room).unwrap();
    assert_eq!(broker.subscriber_count(room), 2);

    drop(first);
    assert_eq!(broker.subscriber_count(room), 1);
  }

  #[tokio::test]
  async fn overflowing_subscriber_is_told_to_resync() {
    let broker = Broker::new(2);
    let room = Uuid::new_v4();
    let mut slow = broker.subscribe(room).unwrap();
    let mut fast = broker.subscribe(room).unwrap();

    broker.publish(&msg(room, 1));
    assert_eq!(id_of(fast.recv().await), 1);
    broker.publish(&msg(room, 2));
    assert_eq!(id_of(fast.recv().await), 2);
    broker.publish(&msg(room, 3));
    assert_eq!(id_of(fast.recv().await), 3);

    // The slow subscriber keeps what was queued, then learns it missed some.
    assert_eq!(id_of(slow.recv().await), 1);
    assert_eq!(id_of(slow.recv().await), 2);
    assert_eq!(slow.recv().await, Some(Delivery::Resync));
    assert_eq!(slow.recv().await, None);

    assert_eq!(broker.subscriber_count(room), 1);
  }

  #[tokio::test]
  async fn stale_ids_are_never_redelivered() {
    let broker = Broker::default();
    let room = Uuid::new_v4();
    let mut sub = broker.subscribe(room).unwrap();

    broker.publish(&msg(room, 5));
    broker.publish(&msg(room, 5));
    broker.publish(&msg(room, 4));
    broker.publish(&msg(room, 6));

    assert_eq!(id_of(sub.recv().await), 5);
    assert_eq!(id_of(sub.recv().await), 6);
  }

  #[tokio::test]
  async fn shutdown_ends_streams_and_rejects_subscribers() {
    let broker = Broker::default();
    let room = Uuid::new_v4();
    let mut sub = broker.subscribe(room).unwrap();

    broker.shutdown();

    assert!(broker.is_shut_down());
    assert!(sub.recv().await.is_none());
    assert!(matches!(broker.subscribe(room), Err(Error::Unavailable(_))));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn no_subscription_outlives_a_racing_shutdown() {
    let broker = Broker::default();
    let room = Uuid::new_v4();

    let tasks: Vec<_> = (0..64)
      .map(|_| {
        let broker = broker.clone();
        tokio::spawn(async move { broker.subscribe(room) })
      })
      .collect();
    broker.shutdown();

    for task in tasks {
      if let Ok(mut sub) = task.await.unwrap() {
        let end = tokio::time::timeout(std::time::Duration::from_secs(1), sub.recv())
          .await
          .expect("subscription should end after shutdown");
        assert!(end.is_none());
      }
    }
    assert_eq!(broker.subscriber_count(room), 0);
  }
}
