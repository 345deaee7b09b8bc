//! Core types and trait definitions for the Murmur chat core.
//!
//! This crate is deliberately free of HTTP, database, and runtime
//! dependencies. Every other crate depends on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod account;
pub mod error;
pub mod message;
pub mod room;
pub mod store;

pub use error::{Error, Result};
