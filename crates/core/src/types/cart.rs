//! Cart aggregate types.
//!
//! The local cart is always a cache of the remote cart. The subtotal is the
//! server-reported value and is never recomputed from lines client-side;
//! tax and grand total are fixed-percentage display values only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::ItemId;
use super::item::Item;

/// Smallest quantity a cart line may carry.
pub const MIN_LINE_QUANTITY: u32 = 1;

/// Display-only tax rate applied to the server subtotal, in percent.
pub const DISPLAY_TAX_PERCENT: u32 = 10;

/// A requested quantity below [`MIN_LINE_QUANTITY`].
///
/// Raised locally, before any network call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("quantity must be at least {MIN_LINE_QUANTITY}, got {0}")]
pub struct InvalidQuantity(pub u32);

/// Check a requested line quantity against the minimum.
///
/// # Errors
///
/// Returns [`InvalidQuantity`] when `quantity` is below [`MIN_LINE_QUANTITY`].
pub const fn validate_quantity(quantity: u32) -> Result<(), InvalidQuantity> {
    if quantity < MIN_LINE_QUANTITY {
        Err(InvalidQuantity(quantity))
    } else {
        Ok(())
    }
}

/// One pending purchase line.
///
/// Carries a denormalized snapshot of the item at time of last fetch, so the
/// cart renders consistently even if the catalog changes underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Item snapshot from the last refresh.
    pub item: Item,
    /// Units of the item; never below [`MIN_LINE_QUANTITY`].
    pub quantity: u32,
}

impl CartLine {
    /// Line total at the snapshot price. Display only.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.item.price * Decimal::from(self.quantity)
    }
}

/// The cart aggregate: ordered lines plus the server-computed subtotal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Lines in backend order.
    pub lines: Vec<CartLine>,
    /// Subtotal as reported by the backend. Authoritative.
    pub subtotal: Decimal,
}

impl Cart {
    /// Total units across all lines (the cart badge value).
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Find the line for an item, if present.
    #[must_use]
    pub fn line(&self, item_id: &ItemId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.item.id == *item_id)
    }
}

/// Display totals derived from the server-reported subtotal.
///
/// Tax and grand total exist purely for presentation and are never sent to
/// the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    /// Server-reported subtotal.
    pub subtotal: Decimal,
    /// Display tax: [`DISPLAY_TAX_PERCENT`] of the subtotal.
    pub tax: Decimal,
    /// Display grand total: subtotal plus tax.
    pub total: Decimal,
}

impl CartTotals {
    /// Derive display totals from a server subtotal.
    #[must_use]
    pub fn from_subtotal(subtotal: Decimal) -> Self {
        let rate = Decimal::from(DISPLAY_TAX_PERCENT) / Decimal::from(100_u32);
        let tax = (subtotal * rate).round_dp(2);
        let total = (subtotal * (Decimal::ONE + rate)).round_dp(2);
        Self {
            subtotal,
            tax,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, price: Decimal) -> Item {
        Item {
            id: ItemId::from(id),
            name: format!("Item {id}"),
            description: String::new(),
            price,
            image: None,
            category: None,
            stock: None,
        }
    }

    #[test]
    fn test_validate_quantity_rejects_zero() {
        assert_eq!(validate_quantity(0), Err(InvalidQuantity(0)));
        assert_eq!(validate_quantity(1), Ok(()));
        assert_eq!(validate_quantity(99), Ok(()));
    }

    #[test]
    fn test_cart_total_quantity_sums_lines() {
        let cart = Cart {
            lines: vec![
                CartLine {
                    item: item("sku-1", Decimal::new(1000, 2)),
                    quantity: 2,
                },
                CartLine {
                    item: item("sku-2", Decimal::new(450, 2)),
                    quantity: 3,
                },
            ],
            subtotal: Decimal::new(3350, 2),
        };
        assert_eq!(cart.total_quantity(), 5);
        assert!(cart.line(&ItemId::from("sku-2")).is_some());
        assert!(cart.line(&ItemId::from("sku-3")).is_none());
    }

    #[test]
    fn test_totals_are_ten_percent_over_subtotal() {
        let totals = CartTotals::from_subtotal(Decimal::new(2000, 2));
        assert_eq!(totals.subtotal, Decimal::new(2000, 2));
        assert_eq!(totals.tax, Decimal::new(200, 2));
        assert_eq!(totals.total, Decimal::new(2200, 2));
    }

    #[test]
    fn test_totals_round_to_cents() {
        // 3.33 * 1.1 = 3.663 -> 3.66
        let totals = CartTotals::from_subtotal(Decimal::new(333, 2));
        assert_eq!(totals.tax, Decimal::new(33, 2));
        assert_eq!(totals.total, Decimal::new(366, 2));
    }

    #[test]
    fn test_line_total_is_price_times_quantity() {
        let line = CartLine {
            item: item("sku-1", Decimal::new(1000, 2)),
            quantity: 3,
        };
        assert_eq!(line.line_total(), Decimal::new(3000, 2));
    }
}
