use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::services::checkout_service;
use crate::state::AppState;
use crate::web::auth::AuthenticatedUser;

/// Initiates a hosted checkout for the caller's cart. No local state is
/// written; the client is redirected to the provider's payment page.
#[instrument(name = "handler::create_checkout_session", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn create_checkout_session_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let redirect = checkout_service::create_checkout_session(&app_state, auth_user.user_id).await?;

  Ok(HttpResponse::Ok().json(json!({
    "sessionId": redirect.session_id,
    "redirectUrl": redirect.redirect_url
  })))
}
