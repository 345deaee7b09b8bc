//! SQL schema for the Murmur SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS rooms (
    room_id       TEXT PRIMARY KEY,
    kind          TEXT NOT NULL,   -- 'dm' | 'group'
    display_name  TEXT,            -- NULL for DM rooms
    created_by    TEXT NOT NULL,
    created_at    TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    dm_key        TEXT UNIQUE,     -- canonical participant pair, DM rooms only
    CHECK ((kind = 'dm') = (dm_key IS NOT NULL)),
    CHECK (kind = 'dm' OR display_name IS NOT NULL)
);

-- Membership only grows; rows are never deleted.
CREATE TABLE IF NOT EXISTS room_members (
    room_id     TEXT NOT NULL REFERENCES rooms(room_id),
    account_id  TEXT NOT NULL,
    joined_at   TEXT NOT NULL,
    PRIMARY KEY (room_id, account_id)
);

-- Messages are strictly append-only.
-- AUTOINCREMENT guarantees ids are never reused and always increase.
CREATE TABLE IF NOT EXISTS messages (
    message_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    room_id          TEXT NOT NULL REFERENCES rooms(room_id),
    sender_id        TEXT NOT NULL,
    kind             TEXT NOT NULL,   -- 'text' | 'image' | 'sticker' | 'audio'
    payload          TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    idempotency_key  TEXT,
    UNIQUE (room_id, sender_id, idempotency_key)
);

CREATE INDEX IF NOT EXISTS members_account_idx ON room_members(account_id);
CREATE INDEX IF NOT EXISTS messages_room_idx   ON messages(room_id, message_id);

PRAGMA user_version = 1;
";
