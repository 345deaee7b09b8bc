//! Rooms — DM and group conversation containers — and their inputs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, account::AccountId, message::MessageId};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// Whether a room is a two-party DM or an open-ended group.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoomKind {
  Dm,
  Group,
}

// ─── Room ────────────────────────────────────────────────────────────────────

/// A conversation container. Rooms are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
  pub room_id:      Uuid,
  pub kind:         RoomKind,
  /// Always `None` for DM rooms, always `Some` for group rooms.
  pub display_name: Option<String>,
  pub created_by:   AccountId,
  pub created_at:   DateTime<Utc>,
}

impl Room {
  pub fn is_dm(&self) -> bool { self.kind == RoomKind::Dm }
}

/// A room together with a pointer to its newest message, as returned by
/// membership queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomActivity {
  pub room:            Room,
  pub last_message_id: Option<MessageId>,
  pub last_message_at: Option<DateTime<Utc>>,
}

impl RoomActivity {
  /// Time of the newest message, or room creation for empty rooms.
  pub fn active_at(&self) -> DateTime<Utc> {
    self.last_message_at.unwrap_or(self.room.created_at)
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// The unordered pair of participants of a DM, stored in canonical order so
/// `(a, b)` and `(b, a)` map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DmPair {
  low:  AccountId,
  high: AccountId,
}

impl DmPair {
  /// Fails with [`Error::InvalidArgument`] when both sides are the same
  /// account; a DM always has exactly two members.
  pub fn new(a: AccountId, b: AccountId) -> Result<Self> {
    if a == b {
      return Err(Error::InvalidArgument(format!(
        "cannot open a direct message between {a} and itself"
      )));
    }
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    Ok(Self { low, high })
  }

  pub fn low(&self) -> &AccountId { &self.low }

  pub fn high(&self) -> &AccountId { &self.high }

  pub fn contains(&self, account: &AccountId) -> bool {
    &self.low == account || &self.high == account
  }

  /// Stable key for the store's uniqueness constraint.
  pub fn key(&self) -> String { format!("{}\u{1f}{}", self.low, self.high) }
}

/// Input to [`crate::store::ChatStore::create_group`].
#[derive(Debug, Clone)]
pub struct NewGroup {
  pub creator: AccountId,
  pub name:    String,
  pub members: Vec<AccountId>,
}

impl NewGroup {
  pub fn new(
    creator: AccountId,
    name: impl Into<String>,
    members: impl IntoIterator<Item = AccountId>,
  ) -> Self {
    Self {
      creator,
      name: name.into(),
      members: members.into_iter().collect(),
    }
  }

  /// Trim the name and collapse duplicate members.
  ///
  /// The member list must be non-empty and contain the creator.
  pub fn validated(self) -> Result<ValidGroup> {
    let name = self.name.trim().to_owned();
    if name.is_empty() {
      return Err(Error::InvalidArgument("group name must not be empty".into()));
    }
    if self.members.is_empty() {
      return Err(Error::InvalidArgument(
        "a group needs at least one member".into(),
      ));
    }
    if !self.members.contains(&self.creator) {
      return Err(Error::InvalidArgument(format!(
        "initial members must include the creator {}",
        self.creator
      )));
    }
    Ok(ValidGroup {
      creator: self.creator,
      name,
      members: self.members.into_iter().collect(),
    })
  }
}

/// A [`NewGroup`] that passed validation.
#[derive(Debug, Clone)]
pub struct ValidGroup {
  pub creator: AccountId,
  pub name:    String,
  pub members: BTreeSet<AccountId>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dm_pair_is_order_independent() {
    let ab = DmPair::new("alice".into(), "bob".into()).unwrap();
    let ba = DmPair::new("bob".into(), "alice".into()).unwrap();
    assert_eq!(ab, ba);
    assert_eq!(ab.key(), ba.key());
    assert_eq!(ab.low().as_str(), "alice");
  }

  #[test]
  fn dm_pair_rejects_self() {
    let err = DmPair::new("alice".into(), "alice".into()).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[test]
  fn group_name_is_trimmed_and_members_deduplicated() {
    let group = NewGroup::new(
      "alice".into(),
      "  painters  ",
      ["alice".into(), "bob".into(), "bob".into()],
    )
    .validated()
    .unwrap();
    assert_eq!(group.name, "painters");
    assert_eq!(group.members.len(), 2);
  }

  #[test]
  fn group_rejects_blank_name() {
    let err = NewGroup::new("alice".into(), " \t ", ["alice".into()])
      .validated()
      .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[test]
  fn group_requires_creator_among_members() {
    let err = NewGroup::new("alice".into(), "club", ["bob".into()])
      .validated()
      .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = NewGroup::new("alice".into(), "club", Vec::new())
      .validated()
      .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
  }

  #[test]
  fn room_kind_text_form() {
    assert_eq!(RoomKind::Dm.to_string(), "dm");
    assert_eq!("group".parse::<RoomKind>().unwrap(), RoomKind::Group);
    assert_eq!(serde_json::to_string(&RoomKind::Group).unwrap(), "\"group\"");
  }
}
