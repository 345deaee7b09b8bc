//! Who is making the request.
//!
//! The account id is asserted by the trusted gateway in front of this router
//! and arrives in the [`ACCOUNT_HEADER`] header.

use axum::{extract::FromRequestParts, http::request::Parts};
use murmur_core::account::AccountId;

use crate::error::ApiError;

pub const ACCOUNT_HEADER: &str = "x-account-id";

/// The calling account.
#[derive(Debug, Clone)]
pub struct Caller(pub AccountId);

impl<St> FromRequestParts<St> for Caller
where
  St: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
    let id = parts
      .headers
      .get(ACCOUNT_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or(ApiError::NoCaller)?;
    Ok(Caller(AccountId::new(id)))
  }
}
