//! Converts cart contents into a hosted payment-session request.
//!
//! Nothing is persisted locally here; all checkout state lives provider-side
//! until the completion webhook arrives.

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::{Cart, CartItemDetail};
use crate::services::payment::{CreateSessionRequest, PaymentProvider, SessionLineItem, META_CART_ID, META_USER_ID};
use crate::state::AppState;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CheckoutRedirect {
  pub session_id: String,
  pub redirect_url: String,
}

/// Builds the provider request from loaded cart items. Fails with
/// `EmptyCart` before any provider call is issued.
pub fn prepare_session_request(
  cart_id: Uuid,
  user_id: Uuid,
  items: &[CartItemDetail],
  config: &AppConfig,
) -> Result<CreateSessionRequest> {
  if items.is_empty() {
    return Err(AppError::EmptyCart);
  }

  let line_items = items
    .iter()
    .map(|item| SessionLineItem {
      name: item.product_name.clone(),
      image_url: item.image_url.clone(),
      unit_amount_cents: i64::from(item.price_cents),
      quantity: i64::from(item.quantity),
    })
    .collect();

  let mut metadata = HashMap::new();
  metadata.insert(META_CART_ID.to_string(), cart_id.to_string());
  metadata.insert(META_USER_ID.to_string(), user_id.to_string());

  Ok(CreateSessionRequest {
    line_items,
    currency: config.currency.clone(),
    success_url: format!("{}/checkout/success", config.app_base_url),
    cancel_url: format!("{}/cart", config.app_base_url),
    metadata,
  })
}

async fn fetch_cart(pool: &PgPool, user_id: Uuid) -> Result<Option<Cart>> {
  let cart: Option<Cart> = sqlx::query_as("SELECT id, user_id, created_at FROM carts WHERE user_id = $1")
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
  Ok(cart)
}

/// Requests a hosted session for already-loaded cart items. The empty-cart
/// short-circuit in `prepare_session_request` runs before the provider is
/// ever contacted.
async fn start_session(
  provider: &dyn PaymentProvider,
  cart_id: Uuid,
  user_id: Uuid,
  items: &[CartItemDetail],
  config: &AppConfig,
) -> Result<CheckoutRedirect> {
  let request = prepare_session_request(cart_id, user_id, items, config)?;
  info!("Requesting hosted session for cart {} ({} line items).", cart_id, items.len());

  let session = provider.create_checkout_session(request).await?;
  let redirect_url = session
    .url
    .ok_or_else(|| AppError::Provider("session created without a redirect URL".to_string()))?;

  info!("Hosted session {} created for cart {}.", session.id, cart_id);
  Ok(CheckoutRedirect {
    session_id: session.id,
    redirect_url,
  })
}

/// Reads the authenticated user's cart and requests a hosted checkout
/// session, returning the provider's redirect URL.
#[instrument(name = "checkout::create_session", skip(state), fields(user_id = %user_id))]
pub async fn create_checkout_session(state: &AppState, user_id: Uuid) -> Result<CheckoutRedirect> {
  let cart = fetch_cart(&state.db_pool, user_id).await?.ok_or(AppError::EmptyCart)?;
  let items = crate::services::cart_service::list_items(&state.db_pool, user_id).await?;
  start_session(state.provider.as_ref(), cart.id, user_id, &items, &state.config).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::payment::CheckoutSession;
  use async_trait::async_trait;
  use chrono::Utc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Counts provider calls so tests can observe whether one was issued.
  struct CountingProvider {
    create_calls: AtomicUsize,
    session_url: Option<String>,
  }

  impl CountingProvider {
    fn returning_url(url: &str) -> Self {
      Self {
        create_calls: AtomicUsize::new(0),
        session_url: Some(url.to_string()),
      }
    }

    fn without_url() -> Self {
      Self {
        create_calls: AtomicUsize::new(0),
        session_url: None,
      }
    }
  }

  #[async_trait]
  impl PaymentProvider for CountingProvider {
    async fn create_checkout_session(&self, request: CreateSessionRequest) -> crate::errors::Result<CheckoutSession> {
      self.create_calls.fetch_add(1, Ordering::SeqCst);
      Ok(CheckoutSession {
        id: "cs_test_1".to_string(),
        url: self.session_url.clone(),
        amount_total: request
          .line_items
          .iter()
          .map(|line| line.unit_amount_cents * line.quantity)
          .sum(),
        currency: request.currency,
        payment_status: "unpaid".to_string(),
        metadata: request.metadata,
      })
    }

    async fn retrieve_session(&self, _session_id: &str) -> crate::errors::Result<CheckoutSession> {
      Err(AppError::Provider("retrieve_session not expected here".to_string()))
    }
  }

  fn test_config() -> AppConfig {
    AppConfig {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: "postgres://localhost/test".to_string(),
      app_base_url: "https://shop.example.com".to_string(),
      payment_api_base_url: "https://api.payments.example.com".to_string(),
      payment_secret_key: "sk_test".to_string(),
      webhook_signing_secret: "whsec_test".to_string(),
      currency: "usd".to_string(),
    }
  }

  fn detail(name: &str, price_cents: i32, quantity: i32) -> CartItemDetail {
    CartItemDetail {
      id: Uuid::new_v4(),
      cart_id: Uuid::new_v4(),
      product_id: Uuid::new_v4(),
      quantity,
      added_at: Utc::now(),
      product_name: name.to_string(),
      price_cents,
      image_url: Some(format!("https://img.example.com/{}.jpg", name)),
    }
  }

  #[test]
  fn empty_cart_fails_before_building_a_request() {
    let err = prepare_session_request(Uuid::new_v4(), Uuid::new_v4(), &[], &test_config()).unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));
  }

  #[tokio::test]
  async fn empty_cart_issues_no_provider_call() {
    let provider = CountingProvider::returning_url("https://pay.example.com/cs_test_1");
    let result = start_session(&provider, Uuid::new_v4(), Uuid::new_v4(), &[], &test_config()).await;

    assert!(matches!(result, Err(AppError::EmptyCart)));
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn populated_cart_makes_exactly_one_provider_call_and_returns_the_redirect() {
    let provider = CountingProvider::returning_url("https://pay.example.com/cs_test_1");
    let items = vec![detail("Mug", 1000, 2)];
    let redirect = start_session(&provider, Uuid::new_v4(), Uuid::new_v4(), &items, &test_config())
      .await
      .unwrap();

    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(redirect.session_id, "cs_test_1");
    assert_eq!(redirect.redirect_url, "https://pay.example.com/cs_test_1");
  }

  #[tokio::test]
  async fn session_without_a_redirect_url_is_a_provider_error() {
    let provider = CountingProvider::without_url();
    let items = vec![detail("Mug", 1000, 1)];
    let err = start_session(&provider, Uuid::new_v4(), Uuid::new_v4(), &items, &test_config())
      .await
      .unwrap_err();

    assert!(matches!(err, AppError::Provider(_)));
  }

  #[test]
  fn line_items_carry_name_image_unit_price_and_quantity() {
    let items = vec![detail("Mug", 1000, 2), detail("Poster", 500, 1)];
    let request = prepare_session_request(Uuid::new_v4(), Uuid::new_v4(), &items, &test_config()).unwrap();

    assert_eq!(request.line_items.len(), 2);
    assert_eq!(request.line_items[0].name, "Mug");
    assert_eq!(request.line_items[0].unit_amount_cents, 1000);
    assert_eq!(request.line_items[0].quantity, 2);
    assert!(request.line_items[1].image_url.is_some());
    assert_eq!(request.currency, "usd");
  }

  #[test]
  fn metadata_correlates_cart_and_user() {
    let cart_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let items = vec![detail("Mug", 1000, 1)];
    let request = prepare_session_request(cart_id, user_id, &items, &test_config()).unwrap();

    assert_eq!(request.metadata.get(META_CART_ID), Some(&cart_id.to_string()));
    assert_eq!(request.metadata.get(META_USER_ID), Some(&user_id.to_string()));
  }

  #[test]
  fn redirect_urls_derive_from_the_app_base_url() {
    let items = vec![detail("Mug", 1000, 1)];
    let request = prepare_session_request(Uuid::new_v4(), Uuid::new_v4(), &items, &test_config()).unwrap();
    assert_eq!(request.success_url, "https://shop.example.com/checkout/success");
    assert_eq!(request.cancel_url, "https://shop.example.com/cart");
  }
}
