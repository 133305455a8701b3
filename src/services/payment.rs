//! Hosted payment provider client and webhook signature verification.
//!
//! The provider hosts the actual payment flow; locally we only create and
//! retrieve checkout sessions, correlated to our state through metadata.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted clock skew between the signature timestamp and now,
/// guarding against replayed deliveries.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Event type reported by the provider when a hosted checkout completes.
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";

pub const META_CART_ID: &str = "cart_id";
pub const META_USER_ID: &str = "user_id";

#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
  pub name: String,
  pub image_url: Option<String>,
  /// Unit price in minor currency units.
  pub unit_amount_cents: i64,
  pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
  pub line_items: Vec<SessionLineItem>,
  pub currency: String,
  pub success_url: String,
  pub cancel_url: String,
  /// Correlation back to local state; must carry cart id and user id.
  pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
  pub id: String,
  /// Hosted page the client is redirected to; present on freshly created sessions.
  pub url: Option<String>,
  pub amount_total: i64,
  pub currency: String,
  pub payment_status: String,
  #[serde(default)]
  pub metadata: HashMap<String, String>,
}

/// Webhook envelope delivered by the provider.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
  #[serde(rename = "type")]
  pub event_type: String,
  pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
  pub object: WebhookEventObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventObject {
  pub id: String,
}

/// Seam between the checkout/order services and the hosted provider.
/// Tests substitute a mock; production wires `HostedPaymentClient`.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
  async fn create_checkout_session(&self, request: CreateSessionRequest) -> Result<CheckoutSession>;

  async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession>;
}

/// HTTP client for the provider's REST API.
pub struct HostedPaymentClient {
  http: reqwest::Client,
  api_base_url: String,
  secret_key: String,
}

impl HostedPaymentClient {
  pub fn new(api_base_url: &str, secret_key: &str) -> Self {
    Self {
      http: reqwest::Client::new(),
      api_base_url: api_base_url.trim_end_matches('/').to_string(),
      secret_key: secret_key.to_string(),
    }
  }

  async fn decode_session(&self, response: reqwest::Response) -> Result<CheckoutSession> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "Payment provider rejected the request");
      return Err(AppError::Provider(format!("provider responded {}: {}", status, body)));
    }
    response
      .json::<CheckoutSession>()
      .await
      .map_err(|e| AppError::Provider(format!("invalid session payload: {}", e)))
  }
}

#[async_trait]
impl PaymentProvider for HostedPaymentClient {
  #[instrument(name = "provider::create_checkout_session", skip(self, request), fields(line_items = request.line_items.len()))]
  async fn create_checkout_session(&self, request: CreateSessionRequest) -> Result<CheckoutSession> {
    info!("Requesting hosted checkout session from payment provider.");
    let response = self
      .http
      .post(format!("{}/v1/checkout/sessions", self.api_base_url))
      .bearer_auth(&self.secret_key)
      .json(&request)
      .send()
      .await
      .map_err(|e| AppError::Provider(format!("provider unreachable: {}", e)))?;
    self.decode_session(response).await
  }

  #[instrument(name = "provider::retrieve_session", skip(self), fields(session_id = %session_id))]
  async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession> {
    let response = self
      .http
      .get(format!("{}/v1/checkout/sessions/{}", self.api_base_url, session_id))
      .bearer_auth(&self.secret_key)
      .send()
      .await
      .map_err(|e| AppError::Provider(format!("provider unreachable: {}", e)))?;
    self.decode_session(response).await
  }
}

/// Verifies a `t=<unix-ts>,v1=<hex-hmac-sha256>` signature header against
/// the shared signing secret. The digest covers `"{timestamp}.{payload}"`.
/// Fails closed: any parse failure, stale timestamp, or digest mismatch is
/// an error, and the raw payload must not be trusted past this point.
pub fn verify_webhook_signature(payload: &[u8], signature_header: &str, secret: &str, now_unix: i64) -> Result<()> {
  let mut timestamp: Option<i64> = None;
  let mut candidates: Vec<Vec<u8>> = Vec::new();

  for part in signature_header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", value)) => {
        timestamp = value.parse::<i64>().ok();
      }
      Some(("v1", value)) => {
        if let Ok(bytes) = hex::decode(value) {
          candidates.push(bytes);
        }
      }
      _ => {} // Unknown schemes are ignored, matching provider versioning.
    }
  }

  let timestamp =
    timestamp.ok_or_else(|| AppError::SignatureVerification("missing or malformed timestamp".to_string()))?;
  if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
    return Err(AppError::SignatureVerification(
      "timestamp outside tolerance window".to_string(),
    ));
  }
  if candidates.is_empty() {
    return Err(AppError::SignatureVerification("no v1 signature present".to_string()));
  }

  for candidate in &candidates {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
      .map_err(|e| AppError::Internal(format!("HMAC init failed: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    // verify_slice is constant-time.
    if mac.verify_slice(candidate).is_ok() {
      return Ok(());
    }
  }

  Err(AppError::SignatureVerification("signature digest mismatch".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  const SECRET: &str = "whsec_test123secret456";

  fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
  }

  #[test]
  fn valid_signature_is_accepted() {
    let payload = br#"{"type":"checkout.session.completed"}"#;
    let now = Utc::now().timestamp();
    let header = sign(payload, SECRET, now);
    assert!(verify_webhook_signature(payload, &header, SECRET, now).is_ok());
  }

  #[test]
  fn signature_from_wrong_secret_is_rejected() {
    let payload = br#"{"type":"checkout.session.completed"}"#;
    let now = Utc::now().timestamp();
    let header = sign(payload, "wrong_secret", now);
    let err = verify_webhook_signature(payload, &header, SECRET, now).unwrap_err();
    assert!(matches!(err, AppError::SignatureVerification(_)));
  }

  #[test]
  fn modified_payload_is_rejected() {
    let payload = br#"{"type":"checkout.session.completed"}"#;
    let tampered = br#"{"type":"checkout.session.completed","hacked":true}"#;
    let now = Utc::now().timestamp();
    let header = sign(payload, SECRET, now);
    assert!(verify_webhook_signature(tampered, &header, SECRET, now).is_err());
  }

  #[test]
  fn stale_timestamp_is_rejected_even_with_valid_digest() {
    let payload = br#"{}"#;
    let now = Utc::now().timestamp();
    let stale = now - SIGNATURE_TOLERANCE_SECS - 1;
    let header = sign(payload, SECRET, stale);
    let err = verify_webhook_signature(payload, &header, SECRET, now).unwrap_err();
    assert!(matches!(err, AppError::SignatureVerification(_)));
  }

  #[test]
  fn header_without_timestamp_or_digest_is_rejected() {
    let payload = br#"{}"#;
    let now = Utc::now().timestamp();
    assert!(verify_webhook_signature(payload, "v1=deadbeef", SECRET, now).is_err());
    assert!(verify_webhook_signature(payload, &format!("t={}", now), SECRET, now).is_err());
    assert!(verify_webhook_signature(payload, "garbage", SECRET, now).is_err());
  }

  #[test]
  fn any_matching_v1_entry_is_sufficient() {
    // During secret rotation the provider may send several v1 digests.
    let payload = br#"{"ok":true}"#;
    let now = Utc::now().timestamp();
    let good = sign(payload, SECRET, now);
    let digest = good.split("v1=").nth(1).unwrap();
    let header = format!("t={},v1={},v1={}", now, "00".repeat(32), digest);
    assert!(verify_webhook_signature(payload, &header, SECRET, now).is_ok());
  }

  #[test]
  fn completed_checkout_event_parses_session_id() {
    let body = br#"{
      "type": "checkout.session.completed",
      "data": { "object": { "id": "cs_test_123", "payment_status": "paid" } }
    }"#;
    let event: WebhookEvent = serde_json::from_slice(body).unwrap();
    assert_eq!(event.event_type, EVENT_CHECKOUT_COMPLETED);
    assert_eq!(event.data.object.id, "cs_test_123");
  }

  #[test]
  fn session_metadata_defaults_to_empty_when_absent() {
    let body = br#"{
      "id": "cs_test_9",
      "url": null,
      "amount_total": 2500,
      "currency": "usd",
      "payment_status": "paid"
    }"#;
    let session: CheckoutSession = serde_json::from_slice(body).unwrap();
    assert!(session.metadata.is_empty());
    assert_eq!(session.amount_total, 2500);
  }
}
