//! HTTP Basic-auth guard for the upstream gateway.
//!
//! Only the gateway holds these credentials; it authenticates end users
//! itself and forwards their account id in `x-account-id`.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::error::Error;

/// Credentials accepted as valid for this server instance.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// The `user:password` pair carried by a `Basic` authorization header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let (scheme, encoded) = value.split_once(' ')?;
  if !scheme.eq_ignore_ascii_case("basic") {
    return None;
  }
  let decoded = String::from_utf8(B64.decode(encoded.trim()).ok()?).ok()?;
  let (user, password) = decoded.split_once(':')?;
  Some((user.to_owned(), password.to_owned()))
}

/// Check the gateway credentials in `headers` against `config`.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  let (user, password) = basic_credentials(headers).ok_or(Error::Unauthorized)?;
  if user != config.username {
    return Err(Error::Unauthorized);
  }

  let expected = PasswordHash::new(&config.password_hash).map_err(|e| {
    tracing::error!("configured gateway password hash is unusable: {e}");
    Error::Unauthorized
  })?;
  Argon2::default()
    .verify_password(password.as_bytes(), &expected)
    .map_err(|_| Error::Unauthorized)
}

/// Middleware rejecting any request without valid gateway credentials.
pub async fn require_auth(
  State(auth): State<Arc<AuthConfig>>,
  req: Request,
  next: Next,
) -> Result<Response, Error> {
  if let Err(e) = verify_auth(req.headers(), &auth) {
    tracing::debug!(path = %req.uri().path(), "rejected gateway credentials");
    return Err(e);
  }
  Ok(next.run(req).await)
}
