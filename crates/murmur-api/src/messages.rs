//! Handlers for `/rooms/{id}/messages`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/rooms/{id}/messages` | Optional `limit`, `before`; ascending, with sender display |
//! | `POST` | `/rooms/{id}/messages` | Body: [`SendBody`]; 201 + message, 200 when replayed |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use murmur_chat::{ChatService, MessageView};
use murmur_core::{
  account::AccountDirectory,
  message::{Message, MessageId, MessageKind, NewMessage},
  store::{ChatStore, HistoryQuery},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::Caller, error::ApiError};

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  /// Page size; defaults to the configured page size and is capped by the
  /// configured maximum.
  pub limit:  Option<usize>,
  /// Only messages older than this id.
  pub before: Option<MessageId>,
}

/// `GET /rooms/{id}/messages[?limit=..][&before=..]`
pub async fn history<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Path(room_id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<MessageView>>, ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  let query = HistoryQuery {
    limit:  params.limit.unwrap_or(chat.config().history_default),
    before: params.before,
  };
  Ok(Json(chat.history_views(room_id, &caller, query).await?))
}

// ─── Send ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendBody {
  #[serde(default)]
  pub kind:            MessageKind,
  /// Message text for `text`, a media URL otherwise.
  pub payload:         String,
  pub idempotency_key: Option<String>,
}

/// `POST /rooms/{id}/messages`
pub async fn send<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Path(room_id): Path<Uuid>,
  Json(body): Json<SendBody>,
) -> Result<(StatusCode, Json<Message>), ApiError>
where
  S: ChatStore,
  D: AccountDirectory,
{
  let payload = match body.kind {
    MessageKind::Text => body.payload.trim().to_owned(),
    _ => body.payload,
  };
  let mut input = NewMessage::new(room_id, caller, body.kind, payload);
  input.idempotency_key = body.idempotency_key;

  let appended = chat.append(input).await?;
  let status = if appended.replayed { StatusCode::OK } else { StatusCode::CREATED };
  Ok((status, Json(appended.message)))
}
