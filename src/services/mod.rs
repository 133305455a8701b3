//! Business logic for the cart -> checkout -> order flow and the payment
//! provider integration. Handlers stay thin and call into these modules.

pub mod cart_service;
pub mod checkout_service;
pub mod order_service;
pub mod payment;
