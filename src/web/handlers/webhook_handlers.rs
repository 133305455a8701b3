use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::errors::AppError;
use crate::services::order_service;
use crate::services::payment::{self, WebhookEvent, EVENT_CHECKOUT_COMPLETED};
use crate::state::AppState;

/// Signature header set by the payment provider on every delivery.
const SIGNATURE_HEADER: &str = "webhook-signature";

/// Maps materializer failures onto the retry contract. A session whose
/// metadata lacks the correlation ids will never gain them, so that
/// failure stays a 400 and stops redelivery; everything else becomes 5xx
/// so the provider tries again.
fn materialization_failure(session_id: &str, err: AppError) -> AppError {
  error!("Order materialization failed for session {}: {}", session_id, err);
  match err {
    AppError::MissingMetadata(_) => err,
    other => AppError::Internal(format!("order materialization failed: {}", other)),
  }
}

/// Trusted entry point for provider-initiated payment notifications.
///
/// The contract is at-least-once delivery: 200 acknowledges the event,
/// 400 rejects an unverifiable payload outright, and any processing
/// failure maps to 5xx so the provider redelivers. Materialization is
/// idempotent per session id, so redelivery is safe.
#[instrument(
  name = "handler::payment_webhook",
  skip(app_state, req, body),
  fields(webhook_source = %source.as_ref(), payload_bytes = body.len())
)]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  source: web::Path<String>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let source = source.into_inner();

  // Fail closed: nothing in the payload is trusted before verification.
  let signature_header = req
    .headers()
    .get(SIGNATURE_HEADER)
    .and_then(|value| value.to_str().ok())
    .ok_or_else(|| {
      warn!("Webhook from '{}' arrived without a signature header.", source);
      AppError::SignatureVerification("missing signature header".to_string())
    })?;

  payment::verify_webhook_signature(
    &body,
    signature_header,
    &app_state.config.webhook_signing_secret,
    Utc::now().timestamp(),
  )?;

  let event: WebhookEvent = serde_json::from_slice(&body)
    .map_err(|e| AppError::Internal(format!("undecodable webhook payload: {}", e)))?;

  if event.event_type != EVENT_CHECKOUT_COMPLETED {
    info!("Ignoring webhook event type '{}'.", event.event_type);
    return Ok(HttpResponse::Ok().json(json!({ "status": "ignored" })));
  }

  let session_id = event.data.object.id;
  info!("Checkout completed for session {}; materializing order.", session_id);

  let order = order_service::materialize_order(&app_state, &session_id)
    .await
    .map_err(|e| materialization_failure(&session_id, e))?;

  Ok(HttpResponse::Ok().json(json!({
    "status": "processed",
    "orderId": order.id
  })))
}
