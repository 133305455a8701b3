use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One active cart per user. Created lazily on the first add and deleted
/// when an order is materialized from it; there is no historical link from
/// an order back to its cart.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Cart {
  pub id: Uuid,
  pub user_id: Uuid,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
  pub id: Uuid,
  pub cart_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub added_at: DateTime<Utc>,
}

/// Cart item joined with the product columns the storefront renders.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CartItemDetail {
  pub id: Uuid,
  pub cart_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub added_at: DateTime<Utc>,
  pub product_name: String,
  pub price_cents: i32,
  pub image_url: Option<String>,
}
