//! [`SqliteStore`] — the SQLite implementation of [`ChatStore`].

use std::{collections::BTreeSet, path::Path};

use chrono::{DateTime, Utc};
use murmur_core::{
  Error as CoreError,
  account::AccountId,
  message::{Appended, Message, NewMessage},
  room::{DmPair, Room, RoomActivity, RoomKind, ValidGroup},
  store::{ChatStore, HistoryQuery},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    MESSAGE_COLUMNS, ROOM_COLUMNS, RawMessage, RawRoom, RawRoomActivity, encode_dt,
    encode_message_kind, encode_room_kind, encode_uuid,
  },
  error::Error,
  schema::SCHEMA,
};

// ─── Closure outcomes ────────────────────────────────────────────────────────
//
// Domain rejections are decided inside the connection closure (so the check
// and the write share a transaction) and turned into errors outside it.

enum CreateDm {
  Created,
  Exists,
}

enum AddMember {
  Done,
  NoRoom,
  IsDm,
}

enum Append {
  Inserted(RawMessage),
  Replayed(RawMessage),
  NoRoom,
  NotMember,
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

fn room_exists(conn: &rusqlite::Connection, room_id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM rooms WHERE room_id = ?1",
        rusqlite::params![room_id],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

/// Creation time for a new message: now, but never before the newest stored
/// message, so timestamps follow id order across rooms.
pub(crate) fn message_stamp(
  conn: &rusqlite::Connection,
  now: DateTime<Utc>,
) -> rusqlite::Result<DateTime<Utc>> {
  let newest: Option<String> = conn
    .query_row(
      "SELECT created_at FROM messages ORDER BY message_id DESC LIMIT 1",
      [],
      |row| row.get(0),
    )
    .optional()?;
  let newest = newest
    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
    .map(|dt| dt.with_timezone(&Utc));
  Ok(newest.map_or(now, |newest| newest.max(now)))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Murmur room and message store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch a single room row, if present.
  async fn fetch_room(&self, room_id: Uuid) -> Result<Option<Room>> {
    let id_str = encode_uuid(room_id);

    let raw: Option<RawRoom> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.room_id = ?1"),
              rusqlite::params![id_str],
              |row| RawRoom::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRoom::into_room).transpose()
  }

  async fn require_room(&self, room_id: Uuid) -> Result<Room> {
    self
      .fetch_room(room_id)
      .await?
      .ok_or_else(|| Error::Core(CoreError::room_not_found(room_id)))
  }
}

// ─── ChatStore impl ──────────────────────────────────────────────────────────

impl ChatStore for SqliteStore {
  type Error = Error;

  // ── Rooms ─────────────────────────────────────────────────────────────────

  async fn create_dm(&self, a: AccountId, b: AccountId) -> Result<Room> {
    let pair = DmPair::new(a.clone(), b.clone())?;
    let room = Room {
      room_id:      Uuid::new_v4(),
      kind:         RoomKind::Dm,
      display_name: None,
      created_by:   a.clone(),
      created_at:   Utc::now(),
    };

    let id_str   = encode_uuid(room.room_id);
    let at_str   = encode_dt(room.created_at);
    let kind_str = encode_room_kind(room.kind);
    let dm_key   = pair.key();
    let members  = [a.to_string(), b.to_string()];

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM rooms WHERE dm_key = ?1",
            rusqlite::params![dm_key],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          return Ok(CreateDm::Exists);
        }

        let inserted = tx.execute(
          "INSERT INTO rooms (room_id, kind, display_name, created_by, created_at, dm_key)
           VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
          rusqlite::params![id_str, kind_str, members[0], at_str, dm_key],
        );
        match inserted {
          Ok(_) => {}
          Err(e) if is_constraint_violation(&e) => return Ok(CreateDm::Exists),
          Err(e) => return Err(e.into()),
        }

        for member in &members {
          tx.execute(
            "INSERT INTO room_members (room_id, account_id, joined_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, member, at_str],
          )?;
        }

        tx.commit()?;
        Ok(CreateDm::Created)
      })
      .await?;

    match outcome {
      CreateDm::Created => Ok(room),
      CreateDm::Exists => {
        tracing::debug!(%a, %b, "direct message already exists for pair");
        Err(Error::Core(CoreError::Conflict(format!(
          "a direct message between {a} and {b} already exists"
        ))))
      }
    }
  }

  async fn create_group(&self, group: ValidGroup) -> Result<Room> {
    let room = Room {
      room_id:      Uuid::new_v4(),
      kind:         RoomKind::Group,
      display_name: Some(group.name),
      created_by:   group.creator,
      created_at:   Utc::now(),
    };

    let id_str   = encode_uuid(room.room_id);
    let at_str   = encode_dt(room.created_at);
    let kind_str = encode_room_kind(room.kind);
    let name     = room.display_name.clone();
    let creator  = room.created_by.to_string();
    let members: Vec<String> = group.members.iter().map(ToString::to_string).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO rooms (room_id, kind, display_name, created_by, created_at, dm_key)
           VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
          rusqlite::params![id_str, kind_str, name, creator, at_str],
        )?;
        for member in &members {
          tx.execute(
            "INSERT INTO room_members (room_id, account_id, joined_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, member, at_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(room)
  }

  async fn get_room(&self, room_id: Uuid) -> Result<Room> {
    self.require_room(room_id).await
  }

  async fn find_dm(&self, a: AccountId, b: AccountId) -> Result<Option<Room>> {
    let dm_key = DmPair::new(a, b)?.key();

    let raw: Option<RawRoom> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.dm_key = ?1"),
              rusqlite::params![dm_key],
              |row| RawRoom::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRoom::into_room).transpose()
  }

  async fn add_member(&self, room_id: Uuid, account: AccountId) -> Result<()> {
    let id_str      = encode_uuid(room_id);
    let account_str = account.to_string();
    let at_str      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let kind: Option<String> = tx
          .query_row(
            "SELECT kind FROM rooms WHERE room_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        match kind.as_deref() {
          None => return Ok(AddMember::NoRoom),
          Some("dm") => return Ok(AddMember::IsDm),
          Some(_) => {}
        }

        tx.execute(
          "INSERT OR IGNORE INTO room_members (room_id, account_id, joined_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, account_str, at_str],
        )?;
        tx.commit()?;
        Ok(AddMember::Done)
      })
      .await?;

    match outcome {
      AddMember::Done => Ok(()),
      AddMember::NoRoom => Err(Error::Core(CoreError::room_not_found(room_id))),
      AddMember::IsDm => Err(Error::Core(CoreError::InvalidState(format!(
        "room {room_id} is a direct message; its members are fixed"
      )))),
    }
  }

  async fn list_members(&self, room_id: Uuid) -> Result<BTreeSet<AccountId>> {
    let id_str = encode_uuid(room_id);

    let rows: Option<Vec<String>> = self
      .conn
      .call(move |conn| {
        if !room_exists(conn, &id_str)? {
          return Ok(None);
        }
        let mut stmt =
          conn.prepare("SELECT account_id FROM room_members WHERE room_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(rows))
      })
      .await?;

    let rows = rows.ok_or_else(|| Error::Core(CoreError::room_not_found(room_id)))?;
    Ok(rows.into_iter().map(AccountId::new).collect())
  }

  async fn is_member(&self, room_id: Uuid, account: AccountId) -> Result<bool> {
    let id_str      = encode_uuid(room_id);
    let account_str = account.to_string();

    let member = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM room_members WHERE room_id = ?1 AND account_id = ?2",
              rusqlite::params![id_str, account_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(member)
  }

  async fn list_rooms(
    &self,
    account: AccountId,
    kind:    Option<RoomKind>,
  ) -> Result<Vec<RoomActivity>> {
    let account_str = account.to_string();
    let kind_str    = kind.map(encode_room_kind);

    let raws: Vec<RawRoomActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ROOM_COLUMNS}, lm.message_id, lm.created_at
           FROM room_members rm
           JOIN rooms r ON r.room_id = rm.room_id
           LEFT JOIN messages lm ON lm.message_id = (
             SELECT MAX(message_id) FROM messages WHERE room_id = r.room_id
           )
           WHERE rm.account_id = ?1
             AND (?2 IS NULL OR r.kind = ?2)"
        ))?;

        let rows = stmt
          .query_map(rusqlite::params![account_str, kind_str], |row| {
            Ok(RawRoomActivity {
              room:            RawRoom::from_row(row, 0)?,
              last_message_id: row.get(5)?,
              last_message_at: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRoomActivity::into_activity).collect()
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn append(&self, input: NewMessage) -> Result<Appended> {
    input.validate()?;

    let room_id     = input.room_id;
    let sender      = input.sender_id.clone();
    let id_str      = encode_uuid(input.room_id);
    let sender_str  = input.sender_id.to_string();
    let kind_str    = encode_message_kind(input.kind);
    let payload     = input.payload;
    let key         = input.idempotency_key;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if !room_exists(&tx, &id_str)? {
          return Ok(Append::NoRoom);
        }

        let member = tx
          .query_row(
            "SELECT 1 FROM room_members WHERE room_id = ?1 AND account_id = ?2",
            rusqlite::params![id_str, sender_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !member {
          return Ok(Append::NotMember);
        }

        if let Some(key) = &key {
          let earlier = tx
            .query_row(
              &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 WHERE m.room_id = ?1 AND m.sender_id = ?2 AND m.idempotency_key = ?3"
              ),
              rusqlite::params![id_str, sender_str, key],
              RawMessage::from_row,
            )
            .optional()?;
          if let Some(raw) = earlier {
            return Ok(Append::Replayed(raw));
          }
        }

        let at_str = encode_dt(message_stamp(&tx, Utc::now())?);
        tx.execute(
          "INSERT INTO messages (room_id, sender_id, kind, payload, created_at, idempotency_key)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, sender_str, kind_str, payload, at_str, key],
        )?;
        let message_id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Append::Inserted(RawMessage {
          message_id,
          room_id: id_str,
          sender_id: sender_str,
          kind: kind_str.to_owned(),
          payload,
          created_at: at_str,
        }))
      })
      .await?;

    match outcome {
      Append::Inserted(raw) => Ok(Appended { message: raw.into_message()?, replayed: false }),
      Append::Replayed(raw) => Ok(Appended { message: raw.into_message()?, replayed: true }),
      Append::NoRoom => Err(Error::Core(CoreError::room_not_found(room_id))),
      Append::NotMember => Err(Error::Core(CoreError::not_a_member(room_id, sender))),
    }
  }

  async fn list_history(&self, room_id: Uuid, query: HistoryQuery) -> Result<Vec<Message>> {
    if query.limit == 0 {
      return Ok(Vec::new());
    }

    let id_str     = encode_uuid(room_id);
    let before     = query.before.map(|id| id.get());
    let limit_val  = i64::try_from(query.limit).unwrap_or(i64::MAX);

    let raws: Option<Vec<RawMessage>> = self
      .conn
      .call(move |conn| {
        if !room_exists(conn, &id_str)? {
          return Ok(None);
        }
        // Newest-first to apply the limit at the recent end, reversed below.
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages m
           WHERE m.room_id = ?1
             AND (?2 IS NULL OR m.message_id < ?2)
           ORDER BY m.message_id DESC
           LIMIT ?3"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, before, limit_val], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(rows))
      })
      .await?;

    let raws = raws.ok_or_else(|| Error::Core(CoreError::room_not_found(room_id)))?;
    raws.into_iter().rev().map(RawMessage::into_message).collect()
  }

  async fn last_message(&self, room_id: Uuid) -> Result<Option<Message>> {
    let mut page = self.list_history(room_id, HistoryQuery::latest(1)).await?;
    Ok(page.pop())
  }
}
