//! Cart operations: per-user mutable (product, quantity) pairs.
//!
//! Each operation is an independent read-then-write against the store; no
//! cross-request coordination is attempted and last write wins per item row.

use crate::errors::{AppError, Result};
use crate::models::{CartItem, CartItemDetail, Product};
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Stock is checked at add/update time only, not continuously enforced.
fn check_requested_quantity(requested: i32, already_in_cart: i32, stock: i32) -> Result<()> {
  if requested <= 0 {
    return Err(AppError::Validation("Quantity must be a positive number.".to_string()));
  }
  let merged = already_in_cart.saturating_add(requested);
  if merged > stock {
    return Err(AppError::InsufficientStock { available: stock });
  }
  Ok(())
}

async fn fetch_product(pool: &PgPool, product_id: Uuid) -> Result<Product> {
  let product: Option<Product> = sqlx::query_as(
    "SELECT id, name, description, price_cents, stock_quantity, image_url, category, created_at, updated_at \
     FROM products WHERE id = $1",
  )
  .bind(product_id)
  .fetch_optional(pool)
  .await?;

  product.ok_or_else(|| {
    warn!("Product {} not found.", product_id);
    AppError::NotFound(format!("Product with ID {} not found.", product_id))
  })
}

/// Returns the id of the user's active cart, creating it lazily.
async fn ensure_cart(pool: &PgPool, user_id: Uuid) -> Result<Uuid> {
  // The no-op update makes ON CONFLICT return the existing row's id.
  let (cart_id,): (Uuid,) = sqlx::query_as(
    "INSERT INTO carts (id, user_id) VALUES ($1, $2) \
     ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
     RETURNING id",
  )
  .bind(Uuid::new_v4())
  .bind(user_id)
  .fetch_one(pool)
  .await?;
  Ok(cart_id)
}

/// Adds a product to the user's cart, merging additively into an existing
/// item. Fails without mutating the cart when the merged quantity would
/// exceed the product's current stock.
#[instrument(name = "cart::add_item", skip(pool), fields(user_id = %user_id, product_id = %product_id, quantity))]
pub async fn add_item(pool: &PgPool, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartItem> {
  let product = fetch_product(pool, product_id).await?;
  let cart_id = ensure_cart(pool, user_id).await?;

  let existing: Option<(i32,)> = sqlx::query_as("SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2")
    .bind(cart_id)
    .bind(product_id)
    .fetch_optional(pool)
    .await?;
  check_requested_quantity(quantity, existing.map_or(0, |(q,)| q), product.stock_quantity)?;

  let item: CartItem = sqlx::query_as(
    "INSERT INTO cart_items (id, cart_id, product_id, quantity) VALUES ($1, $2, $3, $4) \
     ON CONFLICT (cart_id, product_id) DO UPDATE \
     SET quantity = cart_items.quantity + EXCLUDED.quantity, added_at = NOW() \
     RETURNING id, cart_id, product_id, quantity, added_at",
  )
  .bind(Uuid::new_v4())
  .bind(cart_id)
  .bind(product_id)
  .bind(quantity)
  .fetch_one(pool)
  .await?;

  info!(
    "Cart item {} for user {} now has quantity {}.",
    item.id, user_id, item.quantity
  );
  Ok(item)
}

/// Lists the user's cart items joined with product name, price, and image.
/// A user without a cart simply has an empty list.
#[instrument(name = "cart::list_items", skip(pool), fields(user_id = %user_id))]
pub async fn list_items(pool: &PgPool, user_id: Uuid) -> Result<Vec<CartItemDetail>> {
  let items: Vec<CartItemDetail> = sqlx::query_as(
    "SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.added_at, \
            p.name AS product_name, p.price_cents, p.image_url \
     FROM cart_items ci \
     JOIN carts c ON ci.cart_id = c.id \
     JOIN products p ON ci.product_id = p.id \
     WHERE c.user_id = $1 \
     ORDER BY ci.added_at ASC",
  )
  .bind(user_id)
  .fetch_all(pool)
  .await?;
  Ok(items)
}

/// Overwrites an item's quantity. The item must belong to the caller's cart.
#[instrument(name = "cart::update_item", skip(pool), fields(user_id = %user_id, item_id = %item_id, quantity))]
pub async fn update_item(pool: &PgPool, user_id: Uuid, item_id: Uuid, quantity: i32) -> Result<CartItem> {
  let item: Option<CartItem> = sqlx::query_as(
    "SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.added_at \
     FROM cart_items ci JOIN carts c ON ci.cart_id = c.id \
     WHERE ci.id = $1 AND c.user_id = $2",
  )
  .bind(item_id)
  .bind(user_id)
  .fetch_optional(pool)
  .await?;
  let item = item.ok_or_else(|| AppError::NotFound(format!("Cart item {} not found.", item_id)))?;

  let product = fetch_product(pool, item.product_id).await?;
  // Overwrite semantics: the new quantity replaces the old one entirely.
  check_requested_quantity(quantity, 0, product.stock_quantity)?;

  let updated: CartItem = sqlx::query_as(
    "UPDATE cart_items SET quantity = $1 WHERE id = $2 \
     RETURNING id, cart_id, product_id, quantity, added_at",
  )
  .bind(quantity)
  .bind(item_id)
  .fetch_one(pool)
  .await?;

  info!("Cart item {} quantity overwritten to {}.", item_id, quantity);
  Ok(updated)
}

/// Removes an item from the caller's cart.
#[instrument(name = "cart::remove_item", skip(pool), fields(user_id = %user_id, item_id = %item_id))]
pub async fn remove_item(pool: &PgPool, user_id: Uuid, item_id: Uuid) -> Result<()> {
  let result = sqlx::query(
    "DELETE FROM cart_items ci USING carts c \
     WHERE ci.cart_id = c.id AND ci.id = $1 AND c.user_id = $2",
  )
  .bind(item_id)
  .bind(user_id)
  .execute(pool)
  .await?;

  if result.rows_affected() == 0 {
    return Err(AppError::NotFound(format!("Cart item {} not found.", item_id)));
  }
  info!("Cart item {} removed for user {}.", item_id, user_id);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::check_requested_quantity;
  use crate::errors::AppError;

  #[test]
  fn positive_quantity_within_stock_is_accepted() {
    assert!(check_requested_quantity(2, 0, 10).is_ok());
    assert!(check_requested_quantity(3, 7, 10).is_ok());
  }

  #[test]
  fn zero_and_negative_quantities_are_validation_errors() {
    assert!(matches!(check_requested_quantity(0, 0, 10), Err(AppError::Validation(_))));
    assert!(matches!(check_requested_quantity(-1, 0, 10), Err(AppError::Validation(_))));
  }

  #[test]
  fn merged_quantity_beyond_stock_reports_available_count() {
    match check_requested_quantity(4, 7, 10) {
      Err(AppError::InsufficientStock { available }) => assert_eq!(available, 10),
      other => panic!("expected InsufficientStock, got {:?}", other),
    }
  }

  #[test]
  fn exact_stock_boundary_is_allowed() {
    assert!(check_requested_quantity(10, 0, 10).is_ok());
    assert!(matches!(
      check_requested_quantity(11, 0, 10),
      Err(AppError::InsufficientStock { .. })
    ));
  }
}
