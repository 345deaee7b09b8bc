//! Handlers for room endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/rooms/{id}` | Members only |
//! | `GET`  | `/rooms/{id}/members` | Member account ids |
//! | `POST` | `/rooms/{id}/members` | Body: [`AddMemberBody`]; groups only; 204 |
//! | `POST` | `/groups` | Body: [`NewGroupBody`]; returns 201 + room |
//! | `POST` | `/dm` | Body: [`OpenDmBody`]; the caller's DM with the peer |
//! | `GET`  | `/accounts/{id}/rooms` | Caller's own rooms, newest activity first; optional `kind` |

use std::{collections::BTreeSet, sync::Arc};

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use murmur_chat::{ChatService, RoomSummary};
use murmur_core::{
  Error as ChatError,
  account::{AccountDirectory, AccountId},
  room::{NewGroup, Room, RoomKind},
  store::ChatStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::Caller, error::ApiError};

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /rooms/{id}`
pub async fn get_one<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Path(room_id): Path<Uuid>,
) -> Result<Json<Room>, ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  Ok(Json(chat.get_room(room_id, &caller).await?))
}

// ─── Members ──────────────────────────────────────────────────────────────────

/// `GET /rooms/{id}/members`
pub async fn list_members<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Path(room_id): Path<Uuid>,
) -> Result<Json<BTreeSet<AccountId>>, ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  Ok(Json(chat.list_members(room_id, &caller).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberBody {
  pub account_id: AccountId,
}

/// `POST /rooms/{id}/members`
pub async fn add_member<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Path(room_id): Path<Uuid>,
  Json(body): Json<AddMemberBody>,
) -> Result<StatusCode, ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  chat.add_member(room_id, &caller, &body.account_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /groups`. The caller is always a member.
#[derive(Debug, Deserialize)]
pub struct NewGroupBody {
  pub name:    String,
  #[serde(default)]
  pub members: Vec<AccountId>,
}

/// `POST /groups` — returns 201 + the new [`Room`].
pub async fn create_group<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Json(body): Json<NewGroupBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  let mut members = body.members;
  if !members.contains(&caller) {
    members.push(caller.clone());
  }
  let room = chat
    .create_group(NewGroup::new(caller, body.name, members))
    .await?;
  Ok((StatusCode::CREATED, Json(room)))
}

#[derive(Debug, Deserialize)]
pub struct OpenDmBody {
  pub peer_account_id: AccountId,
}

/// `POST /dm`
pub async fn open_dm<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Json(body): Json<OpenDmBody>,
) -> Result<Json<Room>, ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  Ok(Json(chat.get_or_create_dm(&caller, &body.peer_account_id).await?))
}

// ─── Discovery ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Restrict to `dm` or `group` rooms.
  pub kind: Option<RoomKind>,
}

/// `GET /accounts/{id}/rooms[?kind=dm|group]`
pub async fn list_for_account<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Path(account_id): Path<AccountId>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<RoomSummary>>, ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  if account_id != caller {
    return Err(
      ChatError::Forbidden(format!("{caller} may not list rooms of {account_id}")).into(),
    );
  }
  Ok(Json(chat.list_room_summaries(&caller, params.kind).await?))
}
