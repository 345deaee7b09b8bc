//! Foreign references to accounts owned by the external identity service.
//!
//! The core never authorises on account data; membership rows are the only
//! source of truth for access. The directory is consulted purely to decorate
//! messages with a display name and avatar.

use std::{fmt, future::Future};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Opaque account identifier issued by the identity collaborator.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for AccountId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for AccountId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for AccountId {
  fn from(s: String) -> Self { Self(s) }
}

/// What a client shows next to a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDisplay {
  pub name:       String,
  pub avatar_url: Option<String>,
}

/// Lookup interface onto the external account directory.
pub trait AccountDirectory: Send + Sync {
  fn account_exists<'a>(
    &'a self,
    id: &'a AccountId,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;

  /// Returns `None` for unknown accounts; callers fall back to a placeholder.
  fn account_display<'a>(
    &'a self,
    id: &'a AccountId,
  ) -> impl Future<Output = Result<Option<AccountDisplay>>> + Send + 'a;
}
