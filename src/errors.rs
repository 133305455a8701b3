use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Application-level error taxonomy.
///
/// Validation and not-found failures are recovered at the handler boundary
/// and rendered as structured JSON responses; only the webhook path maps
/// processing failures to 5xx so the payment provider redelivers the event.
#[derive(Debug, Error)]
pub enum AppError {
  #[error("Authentication required: {0}")]
  Unauthenticated(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Insufficient stock: only {available} available")]
  InsufficientStock { available: i32 },

  #[error("Cart is empty or missing")]
  EmptyCart,

  #[error("Webhook signature verification failed: {0}")]
  SignatureVerification(String),

  #[error("Payment provider error: {0}")]
  Provider(String),

  #[error("Payment session metadata missing: {0}")]
  MissingMetadata(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

// Convenience for handlers calling into anyhow-returning helpers.
impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    if err.is::<sqlx::Error>() {
      // From<sqlx::Error> exists, but the error may arrive wrapped in anyhow.
      return match err.downcast::<sqlx::Error>() {
        Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
        Err(other) => AppError::Internal(other.to_string()),
      };
    }
    AppError::Internal(err.to_string())
  }
}

impl ResponseError for AppError {
  fn error_response(&self) -> HttpResponse {
    // Log the full error when it's turned into a response.
    tracing::error!(application_error = %self, "Responding with error");
    match self {
      AppError::Unauthenticated(m) => HttpResponse::Unauthorized().json(json!({"error": m})),
      AppError::Forbidden(m) => HttpResponse::Forbidden().json(json!({"error": m})),
      AppError::Validation(m) => HttpResponse::BadRequest().json(json!({"error": m})),
      AppError::NotFound(m) => HttpResponse::NotFound().json(json!({"error": m})),
      AppError::InsufficientStock { .. } => HttpResponse::Conflict().json(json!({"error": self.to_string()})),
      AppError::EmptyCart => HttpResponse::UnprocessableEntity().json(json!({"error": self.to_string()})),
      // Signature failures are rejected outright with 400; the provider
      // must not treat them as transient.
      AppError::SignatureVerification(m) => HttpResponse::BadRequest().json(json!({"error": m})),
      AppError::Provider(m) => {
        HttpResponse::BadGateway().json(json!({"error": "Payment provider error", "detail": m}))
      }
      AppError::MissingMetadata(m) => HttpResponse::BadRequest().json(json!({"error": m})),
      AppError::Config(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "Configuration issue", "detail": m}))
      }
      AppError::Sqlx(_) => HttpResponse::InternalServerError().json(json!({"error": "Database operation failed"})),
      AppError::Internal(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "An internal error occurred", "detail": m}))
      }
    }
  }
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::http::StatusCode;

  fn status_of(err: AppError) -> StatusCode {
    err.error_response().status()
  }

  #[test]
  fn validation_and_signature_failures_map_to_bad_request() {
    assert_eq!(status_of(AppError::Validation("bad quantity".into())), StatusCode::BAD_REQUEST);
    assert_eq!(
      status_of(AppError::SignatureVerification("digest mismatch".into())),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(
      status_of(AppError::MissingMetadata("cart_id".into())),
      StatusCode::BAD_REQUEST
    );
  }

  #[test]
  fn auth_failures_map_to_401_and_403() {
    assert_eq!(
      status_of(AppError::Unauthenticated("no session".into())),
      StatusCode::UNAUTHORIZED
    );
    assert_eq!(status_of(AppError::Forbidden("admin only".into())), StatusCode::FORBIDDEN);
  }

  #[test]
  fn domain_failures_map_to_dedicated_statuses() {
    assert_eq!(status_of(AppError::NotFound("product".into())), StatusCode::NOT_FOUND);
    assert_eq!(
      status_of(AppError::InsufficientStock { available: 3 }),
      StatusCode::CONFLICT
    );
    assert_eq!(status_of(AppError::EmptyCart), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(status_of(AppError::Provider("timeout".into())), StatusCode::BAD_GATEWAY);
  }

  #[test]
  fn processing_failures_map_to_5xx_so_the_provider_retries() {
    assert_eq!(
      status_of(AppError::Internal("order insert failed".into())),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }
}
