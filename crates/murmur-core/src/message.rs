//! Message types — the immutable unit of a room's history.
//!
//! A message is written once through the append path and never changes.
//! Its id is assigned by the store and is strictly increasing, which lets
//! history pages and realtime deliveries be merged by identity alone.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, account::AccountId};

/// Upper bound on a payload, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 4000;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Globally unique, strictly increasing message identifier.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
  pub const fn new(raw: i64) -> Self { Self(raw) }

  pub const fn get(self) -> i64 { self.0 }
}

impl fmt::Display for MessageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── Kind ────────────────────────────────────────────────────────────────────

/// How a client should render the payload.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
  /// Payload is the message body.
  #[default]
  Text,
  /// Payload is a media reference (URL) to an uploaded image.
  Image,
  Sticker,
  Audio,
}

// ─── Message ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub message_id: MessageId,
  pub room_id:    Uuid,
  pub sender_id:  AccountId,
  pub kind:       MessageKind,
  pub payload:    String,
  /// Server-assigned; never changes after creation.
  pub created_at: DateTime<Utc>,
}

// ─── NewMessage ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::ChatStore::append`].
/// The id and timestamp are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub room_id:         Uuid,
  pub sender_id:       AccountId,
  pub kind:            MessageKind,
  pub payload:         String,
  /// Client-chosen token; a repeated append with the same token returns the
  /// original message instead of writing a second one.
  pub idempotency_key: Option<String>,
}

impl NewMessage {
  pub fn new(
    room_id: Uuid,
    sender_id: AccountId,
    kind: MessageKind,
    payload: impl Into<String>,
  ) -> Self {
    Self {
      room_id,
      sender_id,
      kind,
      payload: payload.into(),
      idempotency_key: None,
    }
  }

  pub fn text(room_id: Uuid, sender_id: AccountId, body: impl Into<String>) -> Self {
    Self::new(room_id, sender_id, MessageKind::Text, body)
  }

  pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
    self.idempotency_key = Some(key.into());
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.payload.trim().is_empty() {
      return Err(Error::InvalidArgument("message payload is empty".into()));
    }
    if self.payload.len() > MAX_PAYLOAD_LEN {
      return Err(Error::InvalidArgument(format!(
        "message payload exceeds {MAX_PAYLOAD_LEN} bytes"
      )));
    }
    if let Some(key) = &self.idempotency_key
      && key.trim().is_empty()
    {
      return Err(Error::InvalidArgument("idempotency key is empty".into()));
    }
    Ok(())
  }
}

/// Result of an append.
#[derive(Debug, Clone)]
pub struct Appended {
  pub message:  Message,
  /// `true` when the idempotency key matched an earlier append and nothing
  /// new was written.
  pub replayed: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_payload_is_rejected() {
    let msg = NewMessage::text(Uuid::new_v4(), "alice".into(), "   ");
    assert!(matches!(msg.validate(), Err(Error::InvalidArgument(_))));
  }

  #[test]
  fn oversized_payload_is_rejected() {
    let msg = NewMessage::text(
      Uuid::new_v4(),
      "alice".into(),
      "x".repeat(MAX_PAYLOAD_LEN + 1),
    );
    assert!(matches!(msg.validate(), Err(Error::InvalidArgument(_))));
  }

  #[test]
  fn message_kind_text_form() {
    assert_eq!(MessageKind::Sticker.to_string(), "sticker");
    assert_eq!("audio".parse::<MessageKind>().unwrap(), MessageKind::Audio);
    assert!("video".parse::<MessageKind>().is_err());
  }

  #[test]
  fn message_id_serialises_as_plain_integer() {
    assert_eq!(serde_json::to_string(&MessageId::new(42)).unwrap(), "42");
    assert!(MessageId::new(1) < MessageId::new(2));
  }
}
