//! Orders: submission and history.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use kiln_core::{AddressId, Money, OrderId, OrderItemId, PaymentMethod, ProductId, Quantity};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::api::{ApiClient, ApiError};

const ORDER_PATH: &str = "/order";

/// `{ "id": … }` reference to another backend entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef<I> {
    pub id: I,
}

impl<I> EntityRef<I> {
    pub const fn new(id: I) -> Self {
        Self { id }
    }
}

/// Order body sent on checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub shipping: Money,
    pub payment: PaymentMethod,
    pub address: EntityRef<AddressId>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrderItem {
    pub product: EntityRef<ProductId>,
    pub quantity: Quantity,
}

/// An order as listed in the customer's history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    /// Date as sent by the backend; see [`Order::placed_on`].
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub shipping: Money,
    #[serde(default)]
    pub status: String,
    /// Payment label as stored by the backend.
    #[serde(default)]
    pub payment: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub id: Option<OrderItemId>,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub price: Money,
    #[serde(default)]
    pub quantity: Quantity,
}

impl Order {
    /// Calendar date the order was placed, if the backend date parses.
    #[must_use]
    pub fn placed_on(&self) -> Option<NaiveDate> {
        let raw = self.date.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
    }

    /// Date as `dd/mm/yyyy`, or the raw value when it does not parse.
    #[must_use]
    pub fn display_date(&self) -> String {
        self.placed_on()
            .map_or_else(|| self.date.clone(), |d| d.format("%d/%m/%Y").to_string())
    }

    /// Items plus shipping.
    #[must_use]
    pub fn total(&self) -> Money {
        self.items
            .iter()
            .map(|item| item.price.times(item.quantity))
            .sum::<Money>()
            + self.shipping
    }
}

/// Order operations used by the checkout flow.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Submit an order. The created order is returned when the backend sends
    /// one back in a recognisable shape.
    async fn submit(&self, order: &NewOrder) -> Result<Option<Order>, ApiError>;

    /// The customer's orders.
    async fn list(&self) -> Result<Vec<Order>, ApiError>;
}

/// REST client for `/order`.
#[derive(Clone)]
pub struct OrderClient {
    api: ApiClient,
}

impl OrderClient {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order does not exist or the request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn find_by_id(&self, id: OrderId) -> Result<Order, ApiError> {
        self.api.get(&format!("{ORDER_PATH}/{id}")).await
    }

    /// Delete an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: OrderId) -> Result<(), ApiError> {
        self.api.delete(&format!("{ORDER_PATH}/{id}")).await
    }
}

#[async_trait]
impl OrderApi for OrderClient {
    #[instrument(skip(self, order), fields(items = order.items.len(), payment = %order.payment))]
    async fn submit(&self, order: &NewOrder) -> Result<Option<Order>, ApiError> {
        let body: serde_json::Value = self.api.post(ORDER_PATH, order).await?;
        let created = serde_json::from_value::<Order>(body).ok();
        if created.is_none() {
            debug!("Order accepted without a decodable order body");
        }
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Order>, ApiError> {
        self.api.get(ORDER_PATH).await
    }
}
