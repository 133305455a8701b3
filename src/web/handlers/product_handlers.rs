use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Product;
use crate::state::AppState;
use crate::web::auth::{Action, AuthenticatedUser};

#[derive(Deserialize, Debug)]
pub struct ListProductsQuery {
  pub category: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateProductRequest {
  pub name: String,
  pub description: Option<String>,
  pub price_cents: i32,
  pub stock_quantity: i32,
  pub image_url: Option<String>,
  pub category: Option<String>,
}

const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, stock_quantity, image_url, category, created_at, updated_at";

#[instrument(name = "handler::list_products", skip(app_state, query))]
pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ListProductsQuery>,
) -> Result<HttpResponse, AppError> {
  let products: Vec<Product> = match &query.category {
    Some(category) => {
      sqlx::query_as(&format!(
        "SELECT {} FROM products WHERE category = $1 ORDER BY name ASC",
        PRODUCT_COLUMNS
      ))
      .bind(category)
      .fetch_all(&app_state.db_pool)
      .await?
    }
    None => {
      sqlx::query_as(&format!("SELECT {} FROM products ORDER BY name ASC", PRODUCT_COLUMNS))
        .fetch_all(&app_state.db_pool)
        .await?
    }
  };

  info!("Fetched {} products.", products.len());
  Ok(HttpResponse::Ok().json(json!({ "products": products })))
}

#[instrument(name = "handler::get_product", skip(app_state), fields(product_id = %path.as_ref()))]
pub async fn get_product_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();

  let product: Option<Product> = sqlx::query_as(&format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS))
    .bind(product_id)
    .fetch_optional(&app_state.db_pool)
    .await?;

  match product {
    Some(product) => Ok(HttpResponse::Ok().json(json!({ "product": product }))),
    None => {
      warn!("Product with ID {} not found.", product_id);
      Err(AppError::NotFound(format!("Product with ID {} not found.", product_id)))
    }
  }
}

/// Admin-only catalog insert.
#[instrument(name = "handler::create_product", skip(app_state, payload, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreateProductRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.authorize(Action::ManageProducts)?;

  let payload = payload.into_inner();
  if payload.price_cents < 0 || payload.stock_quantity < 0 {
    return Err(AppError::Validation(
      "Price and stock quantity must not be negative.".to_string(),
    ));
  }

  let product: Product = sqlx::query_as(&format!(
    "INSERT INTO products (id, name, description, price_cents, stock_quantity, image_url, category) \
     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
    PRODUCT_COLUMNS
  ))
  .bind(Uuid::new_v4())
  .bind(&payload.name)
  .bind(&payload.description)
  .bind(payload.price_cents)
  .bind(payload.stock_quantity)
  .bind(&payload.image_url)
  .bind(&payload.category)
  .fetch_one(&app_state.db_pool)
  .await?;

  info!("Product {} created.", product.id);
  Ok(HttpResponse::Created().json(json!({ "product": product })))
}
