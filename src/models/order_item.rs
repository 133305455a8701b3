use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable snapshot of a cart item taken at materialization time.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub price_at_purchase_cents: i32,
}
