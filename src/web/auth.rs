//! Per-request identity and the policy seam for protected operations.
//!
//! Authentication itself is delegated to the identity provider; the proxy in
//! front of this service verifies the session and forwards the claims as
//! headers. Authorization is evaluated per request against those claims,
//! never cached process-wide, and every protected handler goes through the
//! same `authorize` call.

use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "x-auth-user-id";
pub const ROLE_HEADER: &str = "x-auth-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Customer,
  Admin,
}

impl Role {
  fn parse(raw: &str) -> Role {
    if raw.eq_ignore_ascii_case("admin") {
      Role::Admin
    } else {
      Role::Customer
    }
  }
}

/// Operations gated behind a policy check.
#[derive(Debug, Clone, Copy)]
pub enum Action {
  ManageProducts,
  ManageOrders,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  pub role: Role,
}

impl AuthenticatedUser {
  /// Builds the claim from verified proxy headers. Missing or malformed
  /// identity means no session: `Unauthenticated`.
  pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
    let user_id = headers
      .get(USER_ID_HEADER)
      .and_then(|value| value.to_str().ok())
      .and_then(|raw| Uuid::parse_str(raw).ok())
      .ok_or_else(|| {
        warn!("Missing or invalid {} header.", USER_ID_HEADER);
        AppError::Unauthenticated("No user session present.".to_string())
      })?;

    let role = headers
      .get(ROLE_HEADER)
      .and_then(|value| value.to_str().ok())
      .map_or(Role::Customer, Role::parse);

    Ok(AuthenticatedUser { user_id, role })
  }

  /// Single policy evaluation point for every protected operation.
  pub fn authorize(&self, action: Action) -> Result<(), AppError> {
    let allowed = match action {
      Action::ManageProducts | Action::ManageOrders => self.role == Role::Admin,
    };
    if allowed {
      Ok(())
    } else {
      warn!(user_id = %self.user_id, action = ?action, "Policy denied action.");
      Err(AppError::Forbidden(format!("Action {:?} requires the admin role.", action)))
    }
  }
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    futures_util::future::ready(Self::from_headers(req.headers()))
  }
}
