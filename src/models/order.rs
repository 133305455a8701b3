use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Processing,
  Shipping,
  Shipped,
}

impl OrderStatus {
  /// The only state a given status may be reached from. Fulfilment moves
  /// strictly forward: Processing -> Shipping -> Shipped. Status writes
  /// compare-and-set on this predecessor so a stale reader can never move
  /// an order backwards.
  pub fn predecessor(self) -> Option<OrderStatus> {
    match self {
      OrderStatus::Processing => None,
      OrderStatus::Shipping => Some(OrderStatus::Processing),
      OrderStatus::Shipped => Some(OrderStatus::Shipping),
    }
  }

}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub status: OrderStatus,
  /// Provider-reported amount, not recomputed from line items.
  pub total_cents: i64,
  pub currency: String,
  pub payment_method: String,
  /// Idempotency key for webhook redelivery; NULL on the cash-on-delivery path.
  pub payment_session_id: Option<String>,
  pub shipping_address: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::OrderStatus;

  fn allowed(from: OrderStatus, to: OrderStatus) -> bool {
    to.predecessor() == Some(from)
  }

  #[test]
  fn fulfilment_advances_one_step_at_a_time() {
    assert!(allowed(OrderStatus::Processing, OrderStatus::Shipping));
    assert!(allowed(OrderStatus::Shipping, OrderStatus::Shipped));
  }

  #[test]
  fn skipping_or_reversing_states_is_rejected() {
    assert!(!allowed(OrderStatus::Processing, OrderStatus::Shipped));
    assert!(!allowed(OrderStatus::Shipped, OrderStatus::Processing));
    assert!(!allowed(OrderStatus::Shipping, OrderStatus::Processing));
    assert!(!allowed(OrderStatus::Processing, OrderStatus::Processing));
  }

  #[test]
  fn each_step_names_its_only_legal_predecessor() {
    assert_eq!(OrderStatus::Processing.predecessor(), None);
    assert_eq!(OrderStatus::Shipping.predecessor(), Some(OrderStatus::Processing));
    assert_eq!(OrderStatus::Shipped.predecessor(), Some(OrderStatus::Shipping));
  }

  #[test]
  fn a_shipped_order_satisfies_no_transition_predicate() {
    // A writer holding a stale Processing read cannot move a row that has
    // since reached Shipped: no target's predecessor is Shipped, so a
    // predecessor-keyed compare-and-set matches nothing.
    for next in [OrderStatus::Processing, OrderStatus::Shipping, OrderStatus::Shipped] {
      assert_ne!(next.predecessor(), Some(OrderStatus::Shipped));
    }
  }
}
