use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  /// Public base URL of the storefront, used to build the payment
  /// provider's success/cancel redirect URLs.
  pub app_base_url: String,

  // Payment provider
  pub payment_api_base_url: String,
  pub payment_secret_key: String,
  pub webhook_signing_secret: String,

  pub currency: String,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));

    let payment_api_base_url =
      get_env("PAYMENT_API_BASE_URL").unwrap_or_else(|_| "https://api.payments.example.com".to_string());
    let payment_secret_key = get_env("PAYMENT_SECRET_KEY")?;
    let webhook_signing_secret = get_env("WEBHOOK_SIGNING_SECRET")?;

    let currency = get_env("CURRENCY").unwrap_or_else(|_| "usd".to_string());

    tracing::info!("Application configuration loaded successfully.");
    // Secrets are intentionally never logged.

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      payment_api_base_url,
      payment_secret_key,
      webhook_signing_secret,
      currency,
    })
  }
}
