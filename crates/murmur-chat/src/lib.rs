//! Realtime chat core for Murmur.
//!
//! Sits between a [`ChatStore`](murmur_core::store::ChatStore) backend and
//! the transport layer:
//!
//! - [`broker`] fans appended messages out to live subscribers.
//! - [`dm`] finds or creates the unique DM room for a pair of accounts.
//! - [`resolver`] lists an account's rooms by recent activity.
//! - [`service`] ties persistence and fan-out together behind membership
//!   checks.
//! - [`session`] is the client-side view of one room that reconciles history
//!   with realtime delivery.

pub mod broker;
pub mod directory;
pub mod dm;
pub mod resolver;
pub mod service;
pub mod session;

pub use broker::{Broker, Delivery, Subscription, SubscriptionToken};
pub use directory::{InMemoryDirectory, MessageView};
pub use resolver::RoomSummary;
pub use service::{ChatConfig, ChatService};
pub use session::{ChatSession, SessionEvent, SessionState};

/// Lift a backend error into the shared taxonomy.
pub(crate) fn store_err<E: Into<murmur_core::Error>>(e: E) -> murmur_core::Error {
  e.into()
}
