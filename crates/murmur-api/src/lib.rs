//! JSON REST and WebSocket API for Murmur.
//!
//! Exposes an axum [`Router`] backed by a [`ChatService`]. The caller's
//! account id is taken from the `x-account-id` header, which the gateway in
//! front of this router is trusted to set. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", murmur_api::api_router(service.clone()))
//! ```

pub mod caller;
pub mod error;
pub mod messages;
pub mod rooms;
pub mod stream;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use murmur_chat::ChatService;
use murmur_core::{account::AccountDirectory, store::ChatStore};
use serde_json::{Value, json};

pub use caller::{ACCOUNT_HEADER, Caller};
pub use error::ApiError;

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, D>(service: Arc<ChatService<S, D>>) -> Router<()>
where
  S: ChatStore + 'static,
  D: AccountDirectory + 'static,
{
  Router::new()
    // Rooms
    .route("/rooms/{id}", get(rooms::get_one::<S, D>))
    .route(
      "/rooms/{id}/members",
      get(rooms::list_members::<S, D>).post(rooms::add_member::<S, D>),
    )
    .route("/groups", post(rooms::create_group::<S, D>))
    .route("/dm", post(rooms::open_dm::<S, D>))
    .route("/accounts/{id}/rooms", get(rooms::list_for_account::<S, D>))
    // Messages
    .route(
      "/rooms/{id}/messages",
      get(messages::history::<S, D>).post(messages::send::<S, D>),
    )
    .route("/rooms/{id}/stream", get(stream::handler::<S, D>))
    .route("/health", get(health))
    .with_state(service)
}

/// `GET /health`
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

// ─── Router tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use murmur_chat::{ChatConfig, InMemoryDirectory};
  use murmur_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  type Service = ChatService<SqliteStore, InMemoryDirectory>;

  async fn make_service() -> Arc<Service> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let directory = InMemoryDirectory::new()
      .with_account("alice", "Alice", Some("https://img.example/a.png".into()))
      .with_account("bob", "Bob", None);
    Arc::new(ChatService::new(
      Arc::new(store),
      Arc::new(directory),
      ChatConfig::default(),
    ))
  }

  async fn call(
    service: &Arc<Service>,
    method: &str,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
      builder = builder.header(ACCOUNT_HEADER, caller);
    }
    let body = match body {
      Some(json) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    api_router(service.clone())
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap()
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  async fn open_dm(service: &Arc<Service>, from: &str, to: &str) -> String {
    let resp = call(
      service,
      "POST",
      "/dm",
      Some(from),
      Some(json!({ "peer_account_id": to })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    json_body(resp).await["room_id"].as_str().unwrap().to_owned()
  }

  #[tokio::test]
  async fn health_is_ok() {
    let service = make_service().await;
    let resp = call(&service, "GET", "/health", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn missing_caller_is_unauthorized() {
    let service = make_service().await;
    let resp = call(&service, "POST", "/dm", None, Some(json!({ "peer_account_id": "bob" }))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(json_body(resp).await["error"].is_string());
  }

  #[tokio::test]
  async fn dm_is_shared_by_both_sides() {
    let service = make_service().await;
    let a = open_dm(&service, "alice", "bob").await;
    let b = open_dm(&service, "bob", "alice").await;
    assert_eq!(a, b);

    let resp = call(&service, "POST", "/dm", Some("alice"), Some(json!({ "peer_account_id": "alice" }))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn send_then_read_history() {
    let service = make_service().await;
    let room = open_dm(&service, "alice", "bob").await;
    let uri = format!("/rooms/{room}/messages");

    let resp = call(&service, "POST", &uri, Some("alice"), Some(json!({ "payload": "  hi  " }))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent = json_body(resp).await;
    assert_eq!(sent["kind"], "text");
    assert_eq!(sent["payload"], "hi");

    let resp = call(&service, "GET", &uri, Some("bob"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = json_body(resp).await;
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["message_id"], sent["message_id"]);
    assert_eq!(page[0]["sender"]["name"], "Alice");
    assert_eq!(page[0]["sender"]["avatar_url"], "https://img.example/a.png");
  }

  #[tokio::test]
  async fn replayed_send_returns_200_with_the_original() {
    let service = make_service().await;
    let room = open_dm(&service, "alice", "bob").await;
    let uri = format!("/rooms/{room}/messages");
    let body = json!({ "kind": "sticker", "payload": "/s/wave.png", "idempotency_key": "k1" });

    let first = call(&service, "POST", &uri, Some("alice"), Some(body.clone())).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = json_body(first).await;

    let again = call(&service, "POST", &uri, Some("alice"), Some(body)).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(json_body(again).await["message_id"], first["message_id"]);
  }

  #[tokio::test]
  async fn outsiders_are_forbidden() {
    let service = make_service().await;
    let room = open_dm(&service, "alice", "bob").await;

    let resp = call(
      &service,
      "POST",
      &format!("/rooms/{room}/messages"),
      Some("mallory"),
      Some(json!({ "payload": "hello?" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = call(&service, "GET", &format!("/rooms/{room}"), Some("mallory"), None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = call(&service, "GET", "/accounts/alice/rooms", Some("mallory"), None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn unknown_room_is_not_found() {
    let service = make_service().await;
    let resp = call(
      &service,
      "GET",
      &format!("/rooms/{}/messages", uuid::Uuid::new_v4()),
      Some("alice"),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn blank_text_is_rejected() {
    let service = make_service().await;
    let room = open_dm(&service, "alice", "bob").await;
    let resp = call(
      &service,
      "POST",
      &format!("/rooms/{room}/messages"),
      Some("alice"),
      Some(json!({ "payload": "   " })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn groups_grow_but_dms_do_not() {
    let service = make_service().await;

    let resp = call(&service, "POST", "/groups", Some("alice"), Some(json!({ "name": "crew" }))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let group = json_body(resp).await;
    assert_eq!(group["kind"], "group");
    let group_id = group["room_id"].as_str().unwrap().to_owned();

    let resp = call(
      &service,
      "POST",
      &format!("/rooms/{group_id}/members"),
      Some("alice"),
      Some(json!({ "account_id": "bob" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = call(&service, "GET", &format!("/rooms/{group_id}/members"), Some("bob"), None).await;
    assert_eq!(json_body(resp).await, json!(["alice", "bob"]));

    let dm = open_dm(&service, "alice", "bob").await;
    let resp = call(
      &service,
      "POST",
      &format!("/rooms/{dm}/members"),
      Some("alice"),
      Some(json!({ "account_id": "carol" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn room_list_is_filtered_and_carries_previews() {
    let service = make_service().await;
    let dm = open_dm(&service, "alice", "bob").await;
    call(&service, "POST", "/groups", Some("alice"), Some(json!({ "name": "crew" }))).await;
    call(
      &service,
      "POST",
      &format!("/rooms/{dm}/messages"),
      Some("bob"),
      Some(json!({ "payload": "ping" })),
    )
    .await;

    let resp = call(&service, "GET", "/accounts/alice/rooms", Some("alice"), None).await;
    let all = json_body(resp).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["room_id"], dm.as_str());
    assert_eq!(all[0]["last_message"]["payload"], "ping");

    let resp = call(&service, "GET", "/accounts/alice/rooms?kind=group", Some("alice"), None).await;
    let groups = json_body(resp).await;
    assert_eq!(groups.as_array().unwrap().len(), 1);
    assert_eq!(groups[0]["kind"], "group");
    assert!(groups[0]["last_message"].is_null());
  }
}
