use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::services::cart_service;
use crate::state::AppState;
use crate::web::auth::AuthenticatedUser;

#[derive(Deserialize, Debug)]
pub struct AddToCartRequest {
  pub product_id: Uuid,
  pub quantity: i32,
}

#[derive(Deserialize, Debug)]
pub struct UpdateCartItemRequest {
  pub quantity: i32,
}

#[instrument(
  name = "handler::add_to_cart",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, product_id = %payload.product_id, quantity = %payload.quantity)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<AddToCartRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let item = cart_service::add_item(&app_state.db_pool, auth_user.user_id, payload.product_id, payload.quantity).await?;

  Ok(HttpResponse::Ok().json(json!({
    "message": "Item added to cart successfully.",
    "cartItem": item
  })))
}

#[instrument(name = "handler::get_cart", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let items = cart_service::list_items(&app_state.db_pool, auth_user.user_id).await?;
  let total_cents: i64 = items
    .iter()
    .map(|item| i64::from(item.price_cents) * i64::from(item.quantity))
    .sum();

  Ok(HttpResponse::Ok().json(json!({
    "items": items,
    "totalCents": total_cents
  })))
}

#[instrument(
  name = "handler::update_cart_item",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, item_id = %path.as_ref())
)]
pub async fn update_cart_item_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: web::Json<UpdateCartItemRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let item_id = path.into_inner();
  let item = cart_service::update_item(&app_state.db_pool, auth_user.user_id, item_id, payload.quantity).await?;

  Ok(HttpResponse::Ok().json(json!({
    "message": "Cart item updated.",
    "cartItem": item
  })))
}

#[instrument(
  name = "handler::remove_cart_item",
  skip(app_state, auth_user),
  fields(user_id = %auth_user.user_id, item_id = %path.as_ref())
)]
pub async fn remove_cart_item_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let item_id = path.into_inner();
  cart_service::remove_item(&app_state.db_pool, auth_user.user_id, item_id).await?;

  Ok(HttpResponse::Ok().json(json!({ "message": "Cart item removed." })))
}
