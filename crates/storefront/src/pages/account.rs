//! Account page: address book and order history.

use std::sync::{Arc, Mutex, PoisonError};

use kiln_core::{AddressId, OrderId};
use serde::Serialize;
use tracing::{info, instrument};

use crate::addresses::{Address, AddressApi, AddressDraft, AddressError};
use crate::api::ApiError;
use crate::notice::Notice;
use crate::orders::{Order, OrderApi};

/// One rendered order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineView {
    pub product_name: String,
    pub price: String,
    pub quantity: u32,
    pub line_total: String,
}

/// One rendered order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    /// `dd/mm/yyyy`.
    pub date: String,
    pub shipping: String,
    pub status: String,
    pub payment: String,
    pub items: Vec<OrderLineView>,
    pub total: String,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            date: order.display_date(),
            shipping: order.shipping.to_string(),
            status: order.status.clone(),
            payment: order.payment.clone(),
            items: order
                .items
                .iter()
                .map(|item| OrderLineView {
                    product_name: item.product_name.clone(),
                    price: item.price.to_string(),
                    quantity: item.quantity.get(),
                    line_total: item.price.times(item.quantity).to_string(),
                })
                .collect(),
            total: order.total().to_string(),
        }
    }
}

/// Address book and order history for the signed-in customer.
pub struct AccountPage {
    addresses: Arc<dyn AddressApi>,
    orders: Arc<dyn OrderApi>,
    address_book: Mutex<Vec<Address>>,
}

impl AccountPage {
    #[must_use]
    pub fn new(addresses: Arc<dyn AddressApi>, orders: Arc<dyn OrderApi>) -> Self {
        Self {
            addresses,
            orders,
            address_book: Mutex::new(Vec::new()),
        }
    }

    /// Addresses as last loaded.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.address_book
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reload the address book.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; the previous list is kept.
    #[instrument(skip(self))]
    pub async fn refresh_addresses(&self) -> Result<Vec<Address>, AddressError> {
        let addresses = self.addresses.list().await?;
        *self
            .address_book
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = addresses.clone();
        Ok(addresses)
    }

    /// Create or update an address from the form.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Validation`] with per-field messages, or the
    /// backend error.
    #[instrument(skip(self, draft), fields(address_id = ?draft.id))]
    pub async fn save_address(&self, draft: &AddressDraft) -> Result<Notice, AddressError> {
        let address = draft.validate().map_err(AddressError::Validation)?;
        if address.id.is_some() {
            self.addresses.update(&address).await?;
        } else {
            self.addresses.create(&address).await?;
        }
        self.refresh_addresses().await?;
        info!("Address saved");
        Ok(Notice::success("Address saved successfully!"))
    }

    /// Delete an address.
    ///
    /// When the backend refuses (the address is used by an order) the
    /// address stays in the book and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::ReferencedByOrder`] or the backend error.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn delete_address(&self, id: AddressId) -> Result<Notice, AddressError> {
        self.addresses.delete(id).await?;
        self.address_book
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|address| address.id != Some(id));
        info!("Address deleted");
        Ok(Notice::success("Address deleted."))
    }

    /// Load the order history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn orders(&self) -> Result<Vec<OrderView>, ApiError> {
        let mut orders = self.orders.list().await?;
        orders.sort_by(|a, b| b.placed_on().cmp(&a.placed_on()).then(b.id.cmp(&a.id)));
        Ok(orders.iter().map(OrderView::from).collect())
    }
}
