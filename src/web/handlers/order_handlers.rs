use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::OrderStatus;
use crate::services::order_service;
use crate::state::AppState;
use crate::web::auth::{Action, AuthenticatedUser};

#[derive(Deserialize, Debug)]
pub struct CreateCodOrderRequest {
  pub payment_method: String,
  pub cart_id: Uuid,
  pub shipping_address: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateOrderStatusRequest {
  pub status: OrderStatus,
}

#[instrument(name = "handler::list_orders", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = order_service::list_for_user(&app_state.db_pool, auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

#[instrument(
  name = "handler::get_order",
  skip(app_state, auth_user),
  fields(user_id = %auth_user.user_id, order_id = %path.as_ref())
)]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let (order, items) = order_service::get_for_user(&app_state.db_pool, auth_user.user_id, order_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order, "items": items })))
}

/// Cash-on-delivery order creation: materializes the caller's cart without
/// a payment session.
#[instrument(
  name = "handler::create_cod_order",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, cart_id = %payload.cart_id)
)]
pub async fn create_cod_order_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreateCodOrderRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  // Hosted payments go through the checkout session flow; this endpoint
  // only accepts the cash-on-delivery method.
  if payload.payment_method != order_service::PAYMENT_METHOD_COD {
    return Err(AppError::Validation(format!(
      "Unsupported payment method '{}'; use '{}' or the hosted checkout.",
      payload.payment_method,
      order_service::PAYMENT_METHOD_COD
    )));
  }
  let order =
    order_service::create_cod_order(&app_state, auth_user.user_id, payload.cart_id, payload.shipping_address).await?;

  Ok(HttpResponse::Created().json(json!({
    "message": "Order placed for cash on delivery.",
    "order": order
  })))
}

/// Admin-only fulfilment transition.
#[instrument(
  name = "handler::update_order_status",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, order_id = %path.as_ref())
)]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: web::Json<UpdateOrderStatusRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.authorize(Action::ManageOrders)?;

  let order_id = path.into_inner();
  let order = order_service::update_status(&app_state.db_pool, order_id, payload.status).await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order })))
}
