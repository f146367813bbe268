//! Order types.
//!
//! Orders are created server-side from the full cart content and are
//! read-only once listed; the client holds no mutable order model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::OrderId;
use super::item::Item;

/// Order fulfillment status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    /// Any status this client version does not know about.
    #[serde(other)]
    Unknown,
}

/// One purchased line within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    /// Item snapshot at purchase time.
    pub item: Item,
    /// Units purchased.
    pub quantity: u32,
    /// Unit price paid, frozen at purchase time.
    pub price: Decimal,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Backend identifier.
    #[serde(rename = "_id")]
    pub id: OrderId,
    /// Current fulfillment status.
    #[serde(default)]
    pub status: OrderStatus,
    /// Total charged for the order.
    pub total_amount: Decimal,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
    /// Purchased lines.
    #[serde(default)]
    pub items: Vec<OrderLine>,
}
