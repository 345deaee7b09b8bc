//! HTTP server assembly for Murmur.
//!
//! Wires a [`ChatStore`] into a [`ChatService`], mounts the JSON/WebSocket
//! API under `/api` behind gateway Basic auth, and carries the server
//! configuration.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, middleware, routing::get};
use murmur_chat::{ChatConfig, ChatService, InMemoryDirectory};
use murmur_core::{account::AccountId, store::ChatStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// One entry of the static account directory.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountEntry {
  pub id:         AccountId,
  pub name:       String,
  #[serde(default)]
  pub avatar_url: Option<String>,
}

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub store_path:            PathBuf,
  pub auth_username:         String,
  pub auth_password_hash:    String,
  #[serde(default = "defaults::subscriber_buffer")]
  pub subscriber_buffer:     usize,
  #[serde(default = "defaults::history_default_limit")]
  pub history_default_limit: usize,
  #[serde(default = "defaults::history_max_limit")]
  pub history_max_limit:     usize,
  #[serde(default)]
  pub accounts:              Vec<AccountEntry>,
}

mod defaults {
  use murmur_chat::ChatConfig;

  pub fn subscriber_buffer() -> usize { ChatConfig::default().subscriber_buffer }

  pub fn history_default_limit() -> usize { ChatConfig::default().history_default }

  pub fn history_max_limit() -> usize { ChatConfig::default().history_max }
}

impl ServerConfig {
  pub fn chat_config(&self) -> ChatConfig {
    ChatConfig {
      subscriber_buffer: self.subscriber_buffer,
      history_default:   self.history_default_limit,
      history_max:       self.history_max_limit,
    }
  }

  pub fn directory(&self) -> InMemoryDirectory {
    self.accounts.iter().fold(InMemoryDirectory::new(), |dir, a| {
      dir.with_account(a.id.clone(), a.name.clone(), a.avatar_url.clone())
    })
  }

  pub fn auth_config(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Everything the router needs.
#[derive(Clone)]
pub struct AppState<S: ChatStore> {
  pub chat:   Arc<ChatService<S, InMemoryDirectory>>,
  pub config: Arc<ServerConfig>,
  pub auth:   Arc<AuthConfig>,
}

impl<S: ChatStore> AppState<S> {
  pub fn new(store: S, config: ServerConfig) -> Self {
    let chat = ChatService::new(
      Arc::new(store),
      Arc::new(config.directory()),
      config.chat_config(),
    );
    Self {
      chat:   Arc::new(chat),
      auth:   Arc::new(config.auth_config()),
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server's axum [`Router`]: `/health` is open, everything under
/// `/api` requires gateway credentials.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ChatStore + 'static,
{
  let api = murmur_api::api_router(state.chat.clone())
    .layer(middleware::from_fn_with_state(state.auth.clone(), require_auth));

  Router::new()
    .route("/health", get(murmur_api::health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────
