//! Core types for the Shopfront client.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod item;
pub mod order;
pub mod user;

pub use cart::{Cart, CartLine, CartTotals, InvalidQuantity, MIN_LINE_QUANTITY, validate_quantity};
pub use id::*;
pub use item::Item;
pub use order::{Order, OrderLine, OrderStatus};
pub use user::User;
