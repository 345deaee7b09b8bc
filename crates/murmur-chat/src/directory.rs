//! Sender display enrichment.
//!
//! Display data is decoration only: an unknown account or a failing directory
//! yields a placeholder, never an error.

use std::collections::HashMap;

use murmur_core::{
  Result,
  account::{AccountDirectory, AccountDisplay, AccountId},
  message::Message,
};
use serde::Serialize;

/// A message as shown to a reader: the stored message plus who sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
  #[serde(flatten)]
  pub message: Message,
  pub sender:  AccountDisplay,
}

/// What to show for an account the directory knows nothing about.
pub fn placeholder(id: &AccountId) -> AccountDisplay {
  AccountDisplay { name: id.to_string(), avatar_url: None }
}

/// Attach sender display data to each message, looking every distinct sender
/// up once.
pub async fn enrich<D: AccountDirectory>(
  directory: &D,
  messages: Vec<Message>,
) -> Vec<MessageView> {
  let mut cache: HashMap<AccountId, AccountDisplay> = HashMap::new();
  let mut views = Vec::with_capacity(messages.len());

  for message in messages {
    if !cache.contains_key(&message.sender_id) {
      let display = match directory.account_display(&message.sender_id).await {
        Ok(Some(display)) => display,
        Ok(None) => placeholder(&message.sender_id),
        Err(e) => {
          tracing::warn!(sender = %message.sender_id, "account lookup failed: {e}");
          placeholder(&message.sender_id)
        }
      };
      cache.insert(message.sender_id.clone(), display);
    }
    let sender = cache
      .get(&message.sender_id)
      .cloned()
      .unwrap_or_else(|| placeholder(&message.sender_id));
    views.push(MessageView { message, sender });
  }

  views
}

// ─── InMemoryDirectory ───────────────────────────────────────────────────────

/// A fixed account directory, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
  accounts: HashMap<AccountId, AccountDisplay>,
}

impl InMemoryDirectory {
  pub fn new() -> Self { Self::default() }

  pub fn with_account(
    mut self,
    id: impl Into<AccountId>,
    name: impl Into<String>,
    avatar_url: Option<String>,
  ) -> Self {
    self.insert(id, name, avatar_url);
    self
  }

  pub fn insert(
    &mut self,
    id: impl Into<AccountId>,
    name: impl Into<String>,
    avatar_url: Option<String>,
  ) {
    self
      .accounts
      .insert(id.into(), AccountDisplay { name: name.into(), avatar_url });
  }

  pub fn len(&self) -> usize { self.accounts.len() }

  pub fn is_empty(&self) -> bool { self.accounts.is_empty() }
}

impl AccountDirectory for InMemoryDirectory {
  async fn account_exists<'a>(&'a self, id: &'a AccountId) -> Result<bool> {
    Ok(self.accounts.contains_key(id))
  }

  async fn account_display<'a>(
    &'a self,
    id: &'a AccountId,
  ) -> Result<Option<AccountDisplay>> {
    Ok(self.accounts.get(id).cloned())
  }
}
