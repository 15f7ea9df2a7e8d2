//! Cart page.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kiln_core::{Money, PostalCode, ProductId, Quantity};
use serde::Serialize;
use tracing::{debug, instrument};

use super::Route;
use crate::auth::{AuthClient, AuthError};
use crate::cart::{CartError, CartStore, CartSummary};
use crate::shipping::{Parcel, ShippingError, ShippingOption, ShippingQuoter, UNAVAILABLE_MESSAGE};

/// Fixed shipping tiers offered before a postal code is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatRate {
    Standard,
    Express,
}

impl FlatRate {
    pub const ALL: [Self; 2] = [Self::Standard, Self::Express];

    #[must_use]
    pub fn price(self) -> Money {
        match self {
            Self::Standard => Money::from_cents(500),
            Self::Express => Money::from_cents(1000),
        }
    }

    #[must_use]
    pub fn label(self) -> String {
        let name = match self {
            Self::Standard => "Standard Delivery",
            Self::Express => "Express Delivery",
        };
        format!("{name} - {}", self.price())
    }
}

/// Shipping line shown on the cart page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShippingEstimate {
    /// Nothing chosen; shipping is settled at checkout.
    None,
    Flat { rate: FlatRate },
    Quoted {
        postal_code: PostalCode,
        option: ShippingOption,
    },
    Unavailable { postal_code: PostalCode },
}

impl ShippingEstimate {
    #[must_use]
    pub fn cost(&self) -> Option<Money> {
        match self {
            Self::Flat { rate } => Some(rate.price()),
            Self::Quoted { option, .. } => Some(option.price),
            Self::None | Self::Unavailable { .. } => None,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::None => "Shipping & payment options will be selected on the checkout page."
                .to_string(),
            Self::Flat { rate } => rate.label(),
            Self::Quoted { option, .. } => option.label(),
            Self::Unavailable { .. } => UNAVAILABLE_MESSAGE.to_string(),
        }
    }
}

/// One rendered cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineView {
    pub id: ProductId,
    pub title: String,
    pub img: String,
    pub unit_price: String,
    pub quantity: u32,
    pub line_total: String,
    /// The decrement control is disabled at one.
    pub can_decrement: bool,
}

/// Everything the cart page renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u64,
    pub subtotal: String,
    pub shipping: Option<String>,
    pub shipping_message: String,
    pub total: String,
    pub is_empty: bool,
}

/// The shown estimate and the token of the newest estimate request.
///
/// A carrier response is applied only while its token is still `latest`.
/// Choosing a flat rate or changing the cart also advances the token, so a
/// quote still in flight for the old cart is dropped.
struct EstimateSlot {
    estimate: ShippingEstimate,
    latest: u64,
}

/// View model over the cart store.
pub struct CartPage {
    cart: Arc<CartStore>,
    quoter: Arc<dyn ShippingQuoter>,
    parcel: Parcel,
    slot: Mutex<EstimateSlot>,
}

impl CartPage {
    #[must_use]
    pub fn new(cart: Arc<CartStore>, quoter: Arc<dyn ShippingQuoter>, parcel: Parcel) -> Self {
        Self {
            cart,
            quoter,
            parcel,
            slot: Mutex::new(EstimateSlot {
                estimate: ShippingEstimate::None,
                latest: 0,
            }),
        }
    }

    /// Render the current cart.
    #[must_use]
    pub fn view(&self) -> CartView {
        let items = self.cart.items();
        let summary = CartSummary::of(&items);
        let estimate = self.estimate();
        let shipping = estimate.cost();

        CartView {
            lines: items
                .iter()
                .map(|item| CartLineView {
                    id: item.id,
                    title: item.title.clone(),
                    img: item.img.clone(),
                    unit_price: item.price.to_string(),
                    quantity: item.quantity.get(),
                    line_total: item.line_total().to_string(),
                    can_decrement: item.quantity > Quantity::ONE,
                })
                .collect(),
            item_count: summary.item_count,
            subtotal: summary.subtotal.to_string(),
            shipping: shipping.map(|cost| cost.to_string()),
            shipping_message: estimate.message(),
            total: (summary.subtotal + shipping.unwrap_or(Money::ZERO)).to_string(),
            is_empty: summary.is_empty(),
        }
    }

    /// Current shipping estimate.
    #[must_use]
    pub fn estimate(&self) -> ShippingEstimate {
        self.lock_slot().estimate.clone()
    }

    /// # Errors
    ///
    /// Returns an error if the product is not in the cart or storage fails.
    pub fn increment(&self, id: ProductId) -> Result<CartSummary, CartError> {
        let current = self.quantity_of(id)?;
        let summary = self
            .cart
            .update_quantity(id, i64::from(current.increment().get()))?;
        self.drop_quote();
        Ok(summary)
    }

    /// # Errors
    ///
    /// Returns an error if the product is not in the cart or storage fails.
    pub fn decrement(&self, id: ProductId) -> Result<CartSummary, CartError> {
        let current = self.quantity_of(id)?;
        let summary = self
            .cart
            .update_quantity(id, i64::from(current.decrement().get()))?;
        self.drop_quote();
        Ok(summary)
    }

    /// Apply a typed quantity. Anything that is not a positive number
    /// becomes one.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not in the cart or storage fails.
    pub fn set_quantity_input(&self, id: ProductId, input: &str) -> Result<CartSummary, CartError> {
        let requested = input.trim().parse::<i64>().unwrap_or(1);
        let summary = self.cart.update_quantity(id, requested)?;
        self.drop_quote();
        Ok(summary)
    }

    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn remove(&self, id: ProductId) -> Result<CartSummary, CartError> {
        let summary = self.cart.remove(id)?;
        self.drop_quote();
        Ok(summary)
    }

    pub fn select_flat_rate(&self, rate: FlatRate) {
        let mut slot = self.lock_slot();
        slot.latest += 1;
        slot.estimate = ShippingEstimate::Flat { rate };
    }

    /// Quote shipping to a typed postal code and show the cheapest option.
    ///
    /// The result is shown only if no newer estimate was requested, and no
    /// flat rate chosen or cart change made, while the carrier answered.
    ///
    /// # Errors
    ///
    /// Returns [`ShippingError::InvalidDestination`] for an incomplete code or
    /// the carrier error; the estimate then shows as unavailable.
    #[instrument(skip(self))]
    pub async fn estimate_for_postal_code(&self, input: &str) -> Result<ShippingOption, ShippingError> {
        let postal_code = PostalCode::parse(input)
            .map_err(|_| ShippingError::InvalidDestination(input.trim().to_string()))?;
        let token = self.next_token();
        let units = u32::try_from(self.cart.summary().item_count).unwrap_or(u32::MAX);
        let parcels = [self.parcel.clone().with_quantity(units)];

        let cheapest = self
            .quoter
            .quote(&postal_code, &parcels)
            .await
            .and_then(|options| {
                options
                    .into_iter()
                    .min_by_key(|option| option.price)
                    .ok_or(ShippingError::Unavailable)
            });

        match cheapest {
            Ok(option) => {
                debug!(service = %option.name, price = %option.price, "Cart shipping estimate");
                self.settle(
                    token,
                    ShippingEstimate::Quoted {
                        postal_code,
                        option: option.clone(),
                    },
                );
                Ok(option)
            }
            Err(e) => {
                self.settle(token, ShippingEstimate::Unavailable { postal_code });
                Err(e)
            }
        }
    }

    /// Continue to checkout, or to login first.
    ///
    /// # Errors
    ///
    /// Returns an error if the post-login destination cannot be stored.
    pub fn checkout(&self, auth: &AuthClient) -> Result<Route, AuthError> {
        if auth.is_authenticated() {
            return Ok(Route::Checkout);
        }
        auth.remember_destination(&Route::Checkout)?;
        Ok(Route::Login)
    }

    fn quantity_of(&self, id: ProductId) -> Result<Quantity, CartError> {
        self.cart
            .items()
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.quantity)
            .ok_or(CartError::NotInCart(id))
    }

    fn next_token(&self) -> u64 {
        let mut slot = self.lock_slot();
        slot.latest += 1;
        slot.latest
    }

    /// Show `estimate` if `token` is still the newest request.
    fn settle(&self, token: u64, estimate: ShippingEstimate) {
        let mut slot = self.lock_slot();
        if token == slot.latest {
            slot.estimate = estimate;
        } else {
            debug!(token, latest = slot.latest, "Discarding stale cart shipping estimate");
        }
    }

    /// A carrier quote is priced for the unit count it was asked with.
    fn drop_quote(&self) {
        let mut slot = self.lock_slot();
        slot.latest += 1;
        if matches!(
            slot.estimate,
            ShippingEstimate::Quoted { .. } | ShippingEstimate::Unavailable { .. }
        ) {
            slot.estimate = ShippingEstimate::None;
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, EstimateSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
