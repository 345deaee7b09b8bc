//! Resolving "the DM between a and b" to exactly one room.

use std::collections::HashSet;

use murmur_core::{
  Error, Result,
  account::AccountId,
  room::{DmPair, Room, RoomKind},
  store::ChatStore,
};

use crate::store_err;

/// Create attempts before a persistent uniqueness conflict is surfaced.
const CREATE_ATTEMPTS: usize = 3;

/// Return the DM room shared by `a` and `b`, creating it if none exists.
///
/// Argument order does not matter. Concurrent callers for the same pair all
/// converge on one room: the loser of a creation race re-reads and returns
/// the winner's room.
pub async fn get_or_create_dm<S: ChatStore>(
  store: &S,
  a: &AccountId,
  b: &AccountId,
) -> Result<Room> {
  let pair = DmPair::new(a.clone(), b.clone())?;

  for attempt in 1..=CREATE_ATTEMPTS {
    if let Some(room) = existing_dm(store, &pair).await? {
      return Ok(room);
    }

    match store.create_dm(a.clone(), b.clone()).await.map_err(store_err) {
      Ok(room) => {
        tracing::info!(room_id = %room.room_id, %a, %b, "created direct message");
        return Ok(room);
      }
      Err(Error::Conflict(reason)) => {
        tracing::debug!(attempt, %a, %b, "lost direct message creation race: {reason}");
        let winner = store
          .find_dm(a.clone(), b.clone())
          .await
          .map_err(store_err)?;
        if let Some(room) = winner {
          return Ok(room);
        }
      }
      Err(e) => return Err(e),
    }
  }

  Err(Error::Conflict(format!(
    "could not settle a direct message between {a} and {b}"
  )))
}

/// Look up the pair's DM by shared membership.
async fn existing_dm<S: ChatStore>(store: &S, pair: &DmPair) -> Result<Option<Room>> {
  let of_low = store
    .list_rooms(pair.low().clone(), Some(RoomKind::Dm))
    .await
    .map_err(store_err)?;
  if of_low.is_empty() {
    return Ok(None);
  }

  let of_high: HashSet<_> = store
    .list_rooms(pair.high().clone(), Some(RoomKind::Dm))
    .await
    .map_err(store_err)?
    .into_iter()
    .map(|activity| activity.room.room_id)
    .collect();

  let shared = of_low
    .into_iter()
    .map(|activity| activity.room)
    .filter(|room| of_high.contains(&room.room_id))
    .collect();

  Ok(canonical(pair, shared))
}

/// Pick one room out of the pair's DM rooms. More than one is an integrity
/// fault in the stored data; the earliest-created room wins.
fn canonical(pair: &DmPair, mut rooms: Vec<Room>) -> Option<Room> {
  if rooms.len() > 1 {
    tracing::warn!(
      low = %pair.low(),
      high = %pair.high(),
      count = rooms.len(),
      "multiple direct message rooms for one pair; using the oldest"
    );
  }
  rooms.sort_by(|x, y| {
    x.created_at
      .cmp(&y.created_at)
      .then_with(|| x.room_id.cmp(&y.room_id))
  });
  rooms.into_iter().next()
}
