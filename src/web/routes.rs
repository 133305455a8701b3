use actix_web::web;

use crate::web::handlers::{cart_handlers, checkout_handlers, order_handlers, product_handlers, webhook_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("", web::post().to(product_handlers::create_product_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler)),
      )
      .service(
        web::scope("/cart")
          .route("", web::get().to(cart_handlers::get_cart_handler))
          .route("/add", web::post().to(cart_handlers::add_to_cart_handler))
          .route("/items/{item_id}", web::put().to(cart_handlers::update_cart_item_handler))
          .route(
            "/items/{item_id}",
            web::delete().to(cart_handlers::remove_cart_item_handler),
          ),
      )
      .service(web::scope("/checkout").route(
        "",
        web::post().to(checkout_handlers::create_checkout_session_handler),
      ))
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("", web::post().to(order_handlers::create_cod_order_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route(
            "/{order_id}/status",
            web::patch().to(order_handlers::update_order_status_handler),
          ),
      ),
  );

  // Provider-facing entry point, outside the versioned API surface.
  cfg.service(
    web::scope("/api/webhook").route("/{source}", web::post().to(webhook_handlers::payment_webhook_handler)),
  );
}
