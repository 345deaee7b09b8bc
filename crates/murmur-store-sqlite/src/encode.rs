//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Kinds are stored as their lowercase names.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use murmur_core::{
  account::AccountId,
  message::{Message, MessageId, MessageKind},
  room::{Room, RoomActivity, RoomKind},
};
use uuid::Uuid;

use crate::{Error, Result};

/// Column list matching [`RawRoom::from_row`].
pub const ROOM_COLUMNS: &str =
  "r.room_id, r.kind, r.display_name, r.created_by, r.created_at";

/// Column list matching [`RawMessage::from_row`].
pub const MESSAGE_COLUMNS: &str =
  "m.message_id, m.room_id, m.sender_id, m.kind, m.payload, m.created_at";

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Kinds ────────────────────────────────────────────────────────────────────

pub fn encode_room_kind(k: RoomKind) -> &'static str { k.into() }

pub fn decode_room_kind(s: &str) -> Result<RoomKind> {
  RoomKind::from_str(s).map_err(|_| Error::UnknownVariant {
    column: "rooms.kind",
    value:  s.to_owned(),
  })
}

pub fn encode_message_kind(k: MessageKind) -> &'static str { k.into() }

pub fn decode_message_kind(s: &str) -> Result<MessageKind> {
  MessageKind::from_str(s).map_err(|_| Error::UnknownVariant {
    column: "messages.kind",
    value:  s.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `rooms` row.
#[derive(Debug)]
pub struct RawRoom {
  pub room_id:      String,
  pub kind:         String,
  pub display_name: Option<String>,
  pub created_by:   String,
  pub created_at:   String,
}

impl RawRoom {
  /// Read the five [`ROOM_COLUMNS`] starting at column `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      room_id:      row.get(offset)?,
      kind:         row.get(offset + 1)?,
      display_name: row.get(offset + 2)?,
      created_by:   row.get(offset + 3)?,
      created_at:   row.get(offset + 4)?,
    })
  }

  pub fn into_room(self) -> Result<Room> {
    Ok(Room {
      room_id:      decode_uuid(&self.room_id)?,
      kind:         decode_room_kind(&self.kind)?,
      display_name: self.display_name,
      created_by:   AccountId::new(self.created_by),
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// A `rooms` row joined with the id and time of its newest message.
#[derive(Debug)]
pub struct RawRoomActivity {
  pub room:            RawRoom,
  pub last_message_id: Option<i64>,
  pub last_message_at: Option<String>,
}

impl RawRoomActivity {
  pub fn into_activity(self) -> Result<RoomActivity> {
    Ok(RoomActivity {
      room:            self.room.into_room()?,
      last_message_id: self.last_message_id.map(MessageId::new),
      last_message_at: self
        .last_message_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
    })
  }
}

/// Raw values read directly from a `messages` row.
#[derive(Debug)]
pub struct RawMessage {
  pub message_id: i64,
  pub room_id:    String,
  pub sender_id:  String,
  pub kind:       String,
  pub payload:    String,
  pub created_at: String,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id: row.get(0)?,
      room_id:    row.get(1)?,
      sender_id:  row.get(2)?,
      kind:       row.get(3)?,
      payload:    row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id: MessageId::new(self.message_id),
      room_id:    decode_uuid(&self.room_id)?,
      sender_id:  AccountId::new(self.sender_id),
      kind:       decode_message_kind(&self.kind)?,
      payload:    self.payload,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
