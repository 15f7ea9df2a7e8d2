//! Cart line items and their derived summary.

use kiln_core::{Money, ProductId, Quantity};
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::Product;

/// One product in the cart.
///
/// Stored as JSON in local storage. Older entries may lack `quantity` or carry
/// `null` for it and for `img` (the listing pages used to push the whole
/// product object). A missing or null quantity is one; unknown product fields
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ProductId,
    pub title: String,
    pub price: Money,
    #[serde(default, deserialize_with = "quantity_or_one")]
    pub quantity: Quantity,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub img: String,
}

impl CartItem {
    /// Price of this line (unit price times quantity).
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price.times(self.quantity)
    }
}

fn quantity_or_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Quantity, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.map_or(Quantity::ONE, Quantity::clamped))
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<&Product> for CartItem {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            title: product.title.clone(),
            price: product.price,
            quantity: Quantity::ONE,
            img: product.img.clone(),
        }
    }
}

/// Totals derived from the cart contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CartSummary {
    /// Sum of price times quantity over every line.
    pub subtotal: Money,
    /// Sum of quantities.
    pub item_count: u64,
    /// Number of distinct products.
    pub line_count: usize,
}

impl CartSummary {
    /// Fold the summary out of the current lines.
    #[must_use]
    pub fn of(items: &[CartItem]) -> Self {
        items.iter().fold(Self::default(), |acc, item| Self {
            subtotal: acc.subtotal + item.line_total(),
            item_count: acc.item_count + u64::from(item.quantity.get()),
            line_count: acc.line_count + 1,
        })
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.line_count == 0
    }
}
