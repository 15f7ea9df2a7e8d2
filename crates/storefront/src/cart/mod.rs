//! Local cart store.
//!
//! The cart lives only in local storage (key `cart`) until an order is
//! submitted. [`CartStore`] is the single owner of that key: pages read and
//! mutate the cart through it and observe totals via [`CartStore::subscribe`].
//!
//! # Invariants
//!
//! - A product appears at most once; adding it again is refused.
//! - Every quantity is at least one (see [`kiln_core::Quantity`]).
//! - [`CartSummary`] is recomputed from the full list after every change,
//!   never patched incrementally.
//! - Storage is written before memory is updated, so a failed write leaves
//!   the visible cart unchanged.

mod item;

pub use item::{CartItem, CartSummary};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kiln_core::{ProductId, Quantity};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::error::add_breadcrumb;
use crate::storage::{KeyValueStorage, StorageError, keys};

/// Errors returned by cart mutations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product is already a line in the cart.
    #[error("product {0} is already in the cart")]
    AlreadyInCart(ProductId),

    /// The product is not in the cart.
    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),

    /// Local storage could not be written.
    #[error("cart storage error: {0}")]
    Storage(#[from] StorageError),

    /// The cart could not be encoded.
    #[error("cart encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Cart state backed by local storage.
pub struct CartStore {
    storage: Arc<dyn KeyValueStorage>,
    items: Mutex<Vec<CartItem>>,
    summary: watch::Sender<CartSummary>,
}

impl CartStore {
    /// Open the cart, loading whatever is in storage.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let items = read_items(storage.as_ref());
        let (summary, _) = watch::channel(CartSummary::of(&items));
        Self {
            storage,
            items: Mutex::new(items),
            summary,
        }
    }

    /// Re-read storage, replacing the in-memory cart.
    ///
    /// Malformed lines are dropped; unreadable data yields an empty cart.
    pub fn load(&self) -> CartSummary {
        let loaded = read_items(self.storage.as_ref());
        let mut items = self.lock();
        *items = loaded;
        self.publish(&items)
    }

    /// Snapshot of the current lines.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.lock().clone()
    }

    /// Current totals.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        *self.summary.borrow()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Receive the summary now and after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSummary> {
        self.summary.subscribe()
    }

    /// Append a line with quantity one.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::AlreadyInCart`] if the product is already present,
    /// or a storage error if the cart cannot be saved.
    #[instrument(skip(self, item), fields(product_id = %item.id))]
    pub fn add(&self, item: CartItem) -> Result<CartSummary, CartError> {
        let mut items = self.lock();
        if items.iter().any(|line| line.id == item.id) {
            debug!("Product already in cart");
            return Err(CartError::AlreadyInCart(item.id));
        }

        let id = item.id.to_string();
        let mut next = items.clone();
        next.push(CartItem {
            quantity: Quantity::ONE,
            ..item
        });
        let summary = self.commit(&mut items, next)?;
        add_breadcrumb("cart", "Added product to cart", Some(&[("product_id", &id)]));
        Ok(summary)
    }

    /// Set a line's quantity, clamping anything below one to one.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotInCart`] for an unknown product, or a storage
    /// error if the cart cannot be saved.
    #[instrument(skip(self), fields(product_id = %id))]
    pub fn update_quantity(&self, id: ProductId, quantity: i64) -> Result<CartSummary, CartError> {
        let mut items = self.lock();
        if !items.iter().any(|line| line.id == id) {
            return Err(CartError::NotInCart(id));
        }

        let next = items
            .iter()
            .map(|line| {
                if line.id == id {
                    CartItem {
                        quantity: Quantity::clamped(quantity),
                        ..line.clone()
                    }
                } else {
                    line.clone()
                }
            })
            .collect();
        self.commit(&mut items, next)
    }

    /// Remove a line. Removing a product that is not present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the cart cannot be saved.
    #[instrument(skip(self), fields(product_id = %id))]
    pub fn remove(&self, id: ProductId) -> Result<CartSummary, CartError> {
        let mut items = self.lock();
        let next: Vec<CartItem> = items.iter().filter(|line| line.id != id).cloned().collect();
        let summary = self.commit(&mut items, next)?;
        add_breadcrumb(
            "cart",
            "Removed product from cart",
            Some(&[("product_id", &id.to_string())]),
        );
        Ok(summary)
    }

    /// Empty the cart and delete the storage key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the key cannot be removed.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<CartSummary, CartError> {
        let mut items = self.lock();
        self.storage.remove(keys::CART)?;
        items.clear();
        Ok(self.publish(&items))
    }

    /// Persist `next`, then swap it in and publish the new summary.
    fn commit(
        &self,
        items: &mut MutexGuard<'_, Vec<CartItem>>,
        next: Vec<CartItem>,
    ) -> Result<CartSummary, CartError> {
        let encoded = serde_json::to_string(&next)?;
        self.storage.set(keys::CART, &encoded)?;
        **items = next;
        Ok(self.publish(items))
    }

    fn publish(&self, items: &[CartItem]) -> CartSummary {
        let summary = CartSummary::of(items);
        self.summary.send_replace(summary);
        summary
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CartItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decode the stored cart line by line.
///
/// A line that cannot be decoded is dropped on its own; an unreadable key or
/// a value that is not a JSON array yields an empty cart.
fn read_items(storage: &dyn KeyValueStorage) -> Vec<CartItem> {
    let raw = match storage.get(keys::CART) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read cart from storage");
            return Vec::new();
        }
    };

    let entries = match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Discarding malformed cart in storage");
            return Vec::new();
        }
    };

    let items = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<CartItem>(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "Dropping malformed cart line");
                None
            }
        })
        .collect();
    dedupe(items)
}

/// Keep the first line for each product.
fn dedupe(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.id)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use kiln_core::Money;
    use proptest::prelude::*;

    fn item(id: i64, cents: i64) -> CartItem {
        CartItem {
            id: ProductId::new(id),
            title: format!("Peça {id}"),
            price: Money::from_cents(cents),
            quantity: Quantity::ONE,
            img: String::new(),
        }
    }

    fn store() -> (Arc<MemoryStorage>, CartStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = CartStore::new(storage.clone());
        (storage, store)
    }

    #[test]
    fn test_load_defaults_missing_quantity() {
        let storage = Arc::new(MemoryStorage::with_entry(
            keys::CART,
            r#"[{"id":1,"title":"Vaso","price":10.5,"img":"v.jpg"},{"id":2,"title":"Prato","price":4,"quantity":0}]"#,
        ));
        let store = CartStore::new(storage);
        let items = store.items();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.quantity == Quantity::ONE));
        assert_eq!(store.summary().subtotal, Money::from_cents(1450));
        assert_eq!(store.summary().item_count, 2);
    }

    #[test]
    fn test_null_quantity_defaults_to_one() {
        let storage = Arc::new(MemoryStorage::with_entry(
            keys::CART,
            r#"[{"id":1,"title":"Vaso","price":10,"quantity":null},{"id":2,"title":"Prato","price":4,"quantity":2}]"#,
        ));
        let store = CartStore::new(storage);
        let items = store.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, Quantity::ONE);
        assert_eq!(items[1].quantity.get(), 2);
        assert_eq!(store.summary().subtotal, Money::from_cents(1800));
    }

    #[test]
    fn test_null_img_keeps_line() {
        let storage = Arc::new(MemoryStorage::with_entry(
            keys::CART,
            r#"[{"id":1,"title":"Vaso","price":10,"img":null,"category":null}]"#,
        ));
        let store = CartStore::new(storage);
        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].img, "");
    }

    #[test]
    fn test_bad_line_is_dropped_alone() {
        let storage = Arc::new(MemoryStorage::with_entry(
            keys::CART,
            r#"[{"id":1,"title":"Vaso","price":10},{"title":"sem id"},{"id":3,"title":"Xícara","price":"7.50","quantity":2}]"#,
        ));
        let store = CartStore::new(storage.clone());
        assert_eq!(store.summary().line_count, 2);
        assert_eq!(store.summary().subtotal, Money::from_cents(2500));

        // The next write keeps the surviving lines.
        store.update_quantity(ProductId::new(1), 2).unwrap();
        let reopened = CartStore::new(storage);
        assert_eq!(reopened.summary().item_count, 4);
    }

    #[test]
    fn test_malformed_storage_falls_back_to_empty() {
        let storage = Arc::new(MemoryStorage::with_entry(keys::CART, "{not json"));
        let store = CartStore::new(storage);
        assert!(store.is_empty());
        assert_eq!(store.summary(), CartSummary::default());
    }

    #[test]
    fn test_add_persists_and_recomputes() {
        let (storage, store) = store();
        let summary = store.add(item(1, 1000)).unwrap();
        assert_eq!(summary.subtotal, Money::from_cents(1000));
        assert_eq!(summary.item_count, 1);

        let raw = storage.get(keys::CART).unwrap().unwrap();
        let stored: Vec<CartItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, store.items());
    }

    #[test]
    fn test_add_duplicate_is_refused() {
        let (_, store) = store();
        store.add(item(1, 1000)).unwrap();
        store.update_quantity(ProductId::new(1), 3).unwrap();

        let err = store.add(item(1, 1000)).unwrap_err();
        assert!(matches!(err, CartError::AlreadyInCart(id) if id == ProductId::new(1)));
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.summary().item_count, 3);
    }

    #[test]
    fn test_update_quantity_clamps() {
        let (_, store) = store();
        store.add(item(1, 250)).unwrap();

        let summary = store.update_quantity(ProductId::new(1), 4).unwrap();
        assert_eq!(summary.subtotal, Money::from_cents(1000));

        let summary = store.update_quantity(ProductId::new(1), -2).unwrap();
        assert_eq!(summary.item_count, 1);
        assert_eq!(summary.subtotal, Money::from_cents(250));
    }

    #[test]
    fn test_update_unknown_product() {
        let (_, store) = store();
        assert!(matches!(
            store.update_quantity(ProductId::new(9), 2),
            Err(CartError::NotInCart(_))
        ));
    }

    #[test]
    fn test_remove_last_item_empties_cart() {
        let (_, store) = store();
        store.add(item(1, 1999)).unwrap();
        let summary = store.remove(ProductId::new(1)).unwrap();
        assert!(summary.is_empty());
        assert_eq!(summary.subtotal.to_string(), "$0.00");
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_removes_key() {
        let (storage, store) = store();
        store.add(item(1, 100)).unwrap();
        store.clear().unwrap();
        assert!(storage.get(keys::CART).unwrap().is_none());
        assert!(store.summary().is_empty());
    }

    #[test]
    fn test_reload_picks_up_external_writes() {
        let (storage, store) = store();
        storage
            .set(keys::CART, r#"[{"id":5,"title":"Xícara","price":"12.00","quantity":2}]"#)
            .unwrap();
        let summary = store.load();
        assert_eq!(summary.subtotal, Money::from_cents(2400));
    }

    #[test]
    fn test_duplicate_lines_in_storage_are_collapsed() {
        let storage = Arc::new(MemoryStorage::with_entry(
            keys::CART,
            r#"[{"id":1,"title":"A","price":1,"quantity":2},{"id":1,"title":"A","price":1,"quantity":5}]"#,
        ));
        let store = CartStore::new(storage);
        assert_eq!(store.summary().item_count, 2);
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let (_, store) = store();
        let mut rx = store.subscribe();
        store.add(item(1, 300)).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().subtotal, Money::from_cents(300));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(i64, i64),
        Update(i64, i64),
        Remove(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..6, 1i64..10_000).prop_map(|(id, cents)| Op::Add(id, cents)),
            (1i64..6, -5i64..20).prop_map(|(id, qty)| Op::Update(id, qty)),
            (1i64..6).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn subtotal_matches_lines_after_any_sequence(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let (_, store) = store();
            for op in ops {
                let _ = match op {
                    Op::Add(id, cents) => store.add(item(id, cents)),
                    Op::Update(id, qty) => store.update_quantity(ProductId::new(id), qty),
                    Op::Remove(id) => store.remove(ProductId::new(id)),
                };

                let items = store.items();
                let expected: Money = items.iter().map(|i| i.price.times(i.quantity)).sum();
                let summary = store.summary();
                prop_assert_eq!(summary.subtotal, expected);
                prop_assert!(items.iter().all(|i| i.quantity.get() >= 1));
                prop_assert_eq!(summary.line_count, items.len());
            }
        }
    }
}
