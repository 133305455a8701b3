//! Data structures representing database entities and read models.

pub mod cart;
pub mod order;
pub mod order_item;
pub mod product;

pub use cart::{Cart, CartItem, CartItemDetail};
pub use order::{Order, OrderStatus};
pub use order_item::OrderItem;
pub use product::Product;
