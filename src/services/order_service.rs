//! Order materialization: turns a completed payment (or a cash-on-delivery
//! request) into a durable order and clears the source cart.
//!
//! Order creation, line-item snapshot, stock decrement, and cart deletion
//! run inside a single transaction, and the payment session id doubles as
//! an idempotency key, so webhook redelivery of the same event converges on
//! the one existing order.

use crate::errors::{AppError, Result};
use crate::models::{Order, OrderItem, OrderStatus};
use crate::state::AppState;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::services::payment::{META_CART_ID, META_USER_ID};

pub const PAYMENT_METHOD_HOSTED: &str = "hosted_checkout";
pub const PAYMENT_METHOD_COD: &str = "cash_on_delivery";

const ORDER_COLUMNS: &str =
  "id, user_id, status, total_cents, currency, payment_method, payment_session_id, shipping_address, created_at, updated_at";

/// Cart line joined with the product price at materialization time.
#[derive(Debug, Clone, FromRow)]
struct CartLine {
  product_id: Uuid,
  quantity: i32,
  price_cents: i32,
}

struct NewOrder {
  user_id: Uuid,
  total_cents: i64,
  currency: String,
  payment_method: String,
  payment_session_id: Option<String>,
  shipping_address: Option<String>,
}

/// Recovers the (cart id, user id) correlation pair from session metadata.
fn correlation_ids(metadata: &HashMap<String, String>) -> Result<(Uuid, Uuid)> {
  let parse = |key: &str| -> Result<Uuid> {
    metadata
      .get(key)
      .ok_or_else(|| AppError::MissingMetadata(format!("'{}' absent from session metadata", key)))
      .and_then(|raw| {
        Uuid::parse_str(raw).map_err(|_| AppError::MissingMetadata(format!("'{}' is not a valid UUID", key)))
      })
  };
  Ok((parse(META_CART_ID)?, parse(META_USER_ID)?))
}

fn cart_total_cents(lines: &[CartLine]) -> i64 {
  lines
    .iter()
    .map(|line| i64::from(line.price_cents) * i64::from(line.quantity))
    .sum()
}

async fn find_by_session(pool: &PgPool, session_id: &str) -> Result<Option<Order>> {
  let order: Option<Order> = sqlx::query_as(&format!(
    "SELECT {} FROM orders WHERE payment_session_id = $1",
    ORDER_COLUMNS
  ))
  .bind(session_id)
  .fetch_optional(pool)
  .await?;
  Ok(order)
}

async fn load_cart_lines(pool: &PgPool, cart_id: Uuid) -> Result<Vec<CartLine>> {
  let lines: Vec<CartLine> = sqlx::query_as(
    "SELECT ci.product_id, ci.quantity, p.price_cents \
     FROM cart_items ci JOIN products p ON ci.product_id = p.id \
     WHERE ci.cart_id = $1",
  )
  .bind(cart_id)
  .fetch_all(pool)
  .await?;
  Ok(lines)
}

/// Creates the order, snapshots the line items, decrements stock, and
/// deletes the source cart, all in one transaction. A concurrent delivery
/// racing on the same session id loses on the unique index and resolves to
/// the already-persisted order.
async fn persist_order(pool: &PgPool, cart_id: Uuid, new_order: NewOrder, lines: &[CartLine]) -> Result<Order> {
  let mut tx = pool.begin().await?;

  let inserted = sqlx::query_as::<_, Order>(&format!(
    "INSERT INTO orders (id, user_id, status, total_cents, currency, payment_method, payment_session_id, shipping_address) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
    ORDER_COLUMNS
  ))
  .bind(Uuid::new_v4())
  .bind(new_order.user_id)
  .bind(OrderStatus::Processing)
  .bind(new_order.total_cents)
  .bind(&new_order.currency)
  .bind(&new_order.payment_method)
  .bind(&new_order.payment_session_id)
  .bind(&new_order.shipping_address)
  .fetch_one(&mut *tx)
  .await;

  let order = match inserted {
    Ok(order) => order,
    Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
      // Another delivery of the same session already materialized the order.
      drop(tx);
      let session_id = new_order
        .payment_session_id
        .ok_or_else(|| AppError::Internal("unique violation without a session id".to_string()))?;
      info!("Order for session {} already exists; redelivery ignored.", session_id);
      return find_by_session(pool, &session_id)
        .await?
        .ok_or_else(|| AppError::Internal("order vanished after unique violation".to_string()));
    }
    Err(e) => return Err(e.into()),
  };

  for line in lines {
    sqlx::query(
      "INSERT INTO order_items (id, order_id, product_id, quantity, price_at_purchase_cents) \
       VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(order.id)
    .bind(line.product_id)
    .bind(line.quantity)
    .bind(line.price_cents)
    .execute(&mut *tx)
    .await?;

    // Stock can have moved since add-time; clamp rather than go negative.
    sqlx::query("UPDATE products SET stock_quantity = GREATEST(stock_quantity - $1, 0), updated_at = NOW() WHERE id = $2")
      .bind(line.quantity)
      .bind(line.product_id)
      .execute(&mut *tx)
      .await?;
  }

  // Final step of the flow: the cart ceases to exist with the same commit
  // that creates the order. Items cascade.
  sqlx::query("DELETE FROM carts WHERE id = $1")
    .bind(cart_id)
    .execute(&mut *tx)
    .await?;

  tx.commit().await?;
  info!(
    "Order {} materialized ({} line items, {} {}).",
    order.id,
    lines.len(),
    order.total_cents,
    order.currency
  );
  Ok(order)
}

/// Materializes an order from a completed hosted payment session.
///
/// The provider-reported `amount_total` becomes the order total; it is
/// deliberately not recomputed from the cart.
#[instrument(name = "order::materialize", skip(state), fields(session_id = %session_id))]
pub async fn materialize_order(state: &AppState, session_id: &str) -> Result<Order> {
  // Idempotency fast path before talking to the provider.
  if let Some(existing) = find_by_session(&state.db_pool, session_id).await? {
    info!("Session {} already materialized as order {}.", session_id, existing.id);
    return Ok(existing);
  }

  let session = state.provider.retrieve_session(session_id).await?;
  let (cart_id, user_id) = correlation_ids(&session.metadata)?;

  let lines = load_cart_lines(&state.db_pool, cart_id).await?;
  if lines.is_empty() {
    warn!("Session {} references cart {} with no items.", session_id, cart_id);
    return Err(AppError::EmptyCart);
  }

  persist_order(
    &state.db_pool,
    cart_id,
    NewOrder {
      user_id,
      total_cents: session.amount_total,
      currency: session.currency.clone(),
      payment_method: PAYMENT_METHOD_HOSTED.to_string(),
      payment_session_id: Some(session.id.clone()),
      shipping_address: None,
    },
    &lines,
  )
  .await
}

/// Cash-on-delivery path: materializes the user's cart directly, with a
/// locally computed total and no payment session.
#[instrument(name = "order::create_cod", skip(state, address), fields(user_id = %user_id, cart_id = %cart_id))]
pub async fn create_cod_order(state: &AppState, user_id: Uuid, cart_id: Uuid, address: String) -> Result<Order> {
  let owned: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM carts WHERE id = $1 AND user_id = $2")
    .bind(cart_id)
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?;
  if owned.is_none() {
    return Err(AppError::NotFound(format!("Cart {} not found.", cart_id)));
  }

  let lines = load_cart_lines(&state.db_pool, cart_id).await?;
  if lines.is_empty() {
    return Err(AppError::EmptyCart);
  }

  persist_order(
    &state.db_pool,
    cart_id,
    NewOrder {
      user_id,
      total_cents: cart_total_cents(&lines),
      currency: state.config.currency.clone(),
      payment_method: PAYMENT_METHOD_COD.to_string(),
      payment_session_id: None,
      shipping_address: Some(address),
    },
    &lines,
  )
  .await
}

/// Admin transition along Processing -> Shipping -> Shipped.
///
/// The write compares-and-sets on the transition's only legal predecessor,
/// so concurrent updaters cannot interleave a stale read into a backwards
/// move; whichever writer loses the race simply matches no row.
#[instrument(name = "order::update_status", skip(pool), fields(order_id = %order_id, next = ?next))]
pub async fn update_status(pool: &PgPool, order_id: Uuid, next: OrderStatus) -> Result<Order> {
  let required = next.predecessor().ok_or_else(|| {
    AppError::Validation(format!("Order {} cannot be moved back to {:?}.", order_id, next))
  })?;

  let updated: Option<Order> = sqlx::query_as(&format!(
    "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3 RETURNING {}",
    ORDER_COLUMNS
  ))
  .bind(next)
  .bind(order_id)
  .bind(required)
  .fetch_optional(pool)
  .await?;

  match updated {
    Some(order) => {
      info!("Order {} moved to {:?}.", order_id, next);
      Ok(order)
    }
    None => {
      // No row matched: the order is absent, or its current status is not
      // the transition's predecessor (possibly changed since the caller
      // last looked).
      let current: Option<(OrderStatus,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?;
      match current {
        None => Err(AppError::NotFound(format!("Order {} not found.", order_id))),
        Some((status,)) => Err(AppError::Validation(format!(
          "Order {} cannot move from {:?} to {:?}.",
          order_id, status, next
        ))),
      }
    }
  }
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Order>> {
  let orders: Vec<Order> = sqlx::query_as(&format!(
    "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
    ORDER_COLUMNS
  ))
  .bind(user_id)
  .fetch_all(pool)
  .await?;
  Ok(orders)
}

/// Fetches one of the user's orders together with its line items.
pub async fn get_for_user(pool: &PgPool, user_id: Uuid, order_id: Uuid) -> Result<(Order, Vec<OrderItem>)> {
  let order: Option<Order> = sqlx::query_as(&format!(
    "SELECT {} FROM orders WHERE id = $1 AND user_id = $2",
    ORDER_COLUMNS
  ))
  .bind(order_id)
  .bind(user_id)
  .fetch_optional(pool)
  .await?;
  let order = order.ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;

  let items: Vec<OrderItem> = sqlx::query_as(
    "SELECT id, order_id, product_id, quantity, price_at_purchase_cents FROM order_items WHERE order_id = $1",
  )
  .bind(order_id)
  .fetch_all(pool)
  .await?;
  Ok((order, items))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn line(price_cents: i32, quantity: i32) -> CartLine {
    CartLine {
      product_id: Uuid::new_v4(),
      quantity,
      price_cents,
    }
  }

  #[test]
  fn correlation_ids_round_trip_through_metadata() {
    let cart_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let mut metadata = HashMap::new();
    metadata.insert(META_CART_ID.to_string(), cart_id.to_string());
    metadata.insert(META_USER_ID.to_string(), user_id.to_string());

    assert_eq!(correlation_ids(&metadata).unwrap(), (cart_id, user_id));
  }

  #[test]
  fn absent_or_mangled_metadata_is_missing_metadata() {
    let empty = HashMap::new();
    assert!(matches!(correlation_ids(&empty), Err(AppError::MissingMetadata(_))));

    let mut partial = HashMap::new();
    partial.insert(META_CART_ID.to_string(), Uuid::new_v4().to_string());
    assert!(matches!(correlation_ids(&partial), Err(AppError::MissingMetadata(_))));

    let mut mangled = HashMap::new();
    mangled.insert(META_CART_ID.to_string(), "not-a-uuid".to_string());
    mangled.insert(META_USER_ID.to_string(), Uuid::new_v4().to_string());
    assert!(matches!(correlation_ids(&mangled), Err(AppError::MissingMetadata(_))));
  }

  #[test]
  fn cod_total_is_the_sum_of_price_times_quantity() {
    // {productA: qty 2 @ $10, productB: qty 1 @ $5} totals $25.
    let lines = vec![line(1000, 2), line(500, 1)];
    assert_eq!(cart_total_cents(&lines), 2500);
  }

  #[test]
  fn cod_total_of_no_lines_is_zero() {
    assert_eq!(cart_total_cents(&[]), 0);
  }
}
