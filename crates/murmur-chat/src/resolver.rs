//! Which rooms an account sees, most recently active first.

use std::cmp::Ordering;

use murmur_core::{
  Result,
  account::AccountId,
  message::Message,
  room::{Room, RoomActivity, RoomKind},
  store::ChatStore,
};
use serde::Serialize;

use crate::store_err;

/// A room list entry with a preview of its newest message.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
  #[serde(flatten)]
  pub room:         Room,
  pub last_message: Option<Message>,
}

/// Most recent activity first. Rooms without messages rank by creation
/// time; ties fall back to the newest message id, then the room id.
///
/// Stores stamp messages in id order, so for rooms with messages this is the
/// order of their newest ids.
pub fn by_activity(x: &RoomActivity, y: &RoomActivity) -> Ordering {
  y.active_at()
    .cmp(&x.active_at())
    .then_with(|| y.last_message_id.cmp(&x.last_message_id))
    .then_with(|| x.room.room_id.cmp(&y.room.room_id))
}

async fn ordered<S: ChatStore>(
  store: &S,
  account: &AccountId,
  kind: Option<RoomKind>,
) -> Result<Vec<RoomActivity>> {
  let mut rooms = store
    .list_rooms(account.clone(), kind)
    .await
    .map_err(store_err)?;
  rooms.sort_by(by_activity);
  Ok(rooms)
}

/// Rooms `account` is a member of, optionally of one kind only.
pub async fn list_rooms_for<S: ChatStore>(
  store: &S,
  account: &AccountId,
  kind: Option<RoomKind>,
) -> Result<Vec<Room>> {
  let rooms = ordered(store, account, kind).await?;
  Ok(rooms.into_iter().map(|activity| activity.room).collect())
}

/// Like [`list_rooms_for`], with each room's newest message attached.
pub async fn list_room_summaries<S: ChatStore>(
  store: &S,
  account: &AccountId,
  kind: Option<RoomKind>,
) -> Result<Vec<RoomSummary>> {
  let rooms = ordered(store, account, kind).await?;

  let mut summaries = Vec::with_capacity(rooms.len());
  for activity in rooms {
    let last_message = match activity.last_message_id {
      Some(_) => store
        .last_message(activity.room.room_id)
        .await
        .map_err(store_err)?,
      None => None,
    };
    summaries.push(RoomSummary { room: activity.room, last_message });
  }
  Ok(summaries)
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, Utc};
  use murmur_core::{
    message::{MessageId, NewMessage},
    room::NewGroup,
  };
  use murmur_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;

  fn acct(id: &str) -> AccountId { AccountId::new(id) }

  #[tokio::test]
  async fn most_recent_activity_comes_first() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let ab = store.create_dm(acct("alice"), acct("bob")).await.unwrap();
    let ac = store.create_dm(acct("alice"), acct("carol")).await.unwrap();
    let group = store
      .create_group(
        NewGroup::new(acct("alice"), "crew", [acct("alice"), acct("bob")])
          .validated()
          .unwrap(),
      )
      .await
      .unwrap();

    store.append(NewMessage::text(ac.room_id, acct("carol"), "first")).await.unwrap();
    store.append(NewMessage::text(ab.room_id, acct("bob"), "second")).await.unwrap();

    let rooms = list_rooms_for(&store, &acct("alice"), None).await.unwrap();
    let ids: Vec<_> = rooms.iter().map(|r| r.room_id).collect();
    assert_eq!(ids, vec![ab.room_id, ac.room_id, group.room_id]);

    let dms = list_rooms_for(&store, &acct("alice"), Some(RoomKind::Dm)).await.unwrap();
    assert_eq!(
      dms.iter().map(|r| r.room_id).collect::<Vec<_>>(),
      vec![ab.room_id, ac.room_id]
    );
  }

  #[tokio::test]
  async fn non_member_rooms_are_not_listed() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.create_dm(acct("alice"), acct("bob")).await.unwrap();

    assert!(list_rooms_for(&store, &acct("carol"), None).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn summaries_carry_the_newest_message() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let ab = store.create_dm(acct("alice"), acct("bob")).await.unwrap();
    let ac = store.create_dm(acct("alice"), acct("carol")).await.unwrap();
    store.append(NewMessage::text(ab.room_id, acct("bob"), "old")).await.unwrap();
    store.append(NewMessage::text(ab.room_id, acct("alice"), "new")).await.unwrap();

    let summaries = list_room_summaries(&store, &acct("alice"), None).await.unwrap();
    let of = |id| summaries.iter().find(|s| s.room.room_id == id).unwrap();

    assert_eq!(of(ab.room_id).last_message.as_ref().unwrap().payload, "new");
    assert!(of(ac.room_id).last_message.is_none());
  }

  #[test]
  fn ordering_breaks_ties_deterministically() {
    let at = Utc::now();
    let activity = |id: u128, last: Option<i64>, created_ago: i64| RoomActivity {
      room: Room {
        room_id:      Uuid::from_u128(id),
        kind:         RoomKind::Group,
        display_name: Some("g".into()),
        created_by:   acct("alice"),
        created_at:   at - Duration::minutes(created_ago),
      },
      last_message_id: last.map(MessageId::new),
      last_message_at: last.map(|_| at),
    };

    let mut rooms = vec![
      activity(1, None, 60),
      activity(2, Some(3), 90),
      activity(3, Some(9), 90),
      activity(4, None, 0),
      activity(5, None, 0),
    ];
    rooms.sort_by(by_activity);

    let order: Vec<u128> = rooms.iter().map(|r| r.room.room_id.as_u128()).collect();
    assert_eq!(order, vec![3, 2, 4, 5, 1]);
  }
}
