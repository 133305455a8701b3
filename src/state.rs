use crate::config::AppConfig;
use crate::services::payment::PaymentProvider;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub db_pool: PgPool,
  pub provider: Arc<dyn PaymentProvider>,
  pub config: Arc<AppConfig>,
}
