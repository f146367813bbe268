//! Catalog item types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ItemId;

/// A catalog item as reported by the backend.
///
/// Cart lines and order lines carry a denormalized snapshot of this type
/// taken at fetch time; the backend remains authoritative for current
/// pricing and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Backend identifier.
    #[serde(rename = "_id")]
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Unit price in the store currency.
    pub price: Decimal,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Category slug (e.g. "electronics").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Units in stock, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
}
