//! Checkout flow.
//!
//! Orchestrates the address book, the carrier quote and order submission for
//! the current cart. The flow is driven by the page layer (select an address,
//! pick a payment method, submit) and exposes its state through
//! [`CheckoutFlow::snapshot`].
//!
//! # Shipping calculations
//!
//! Every address change starts a new calculation with a fresh sequence token.
//! Responses are applied only when their token is still the latest one, so
//! whatever order the carrier answers in, the quote shown always belongs to the
//! last address the customer selected. Superseded responses are dropped.
//!
//! [`CheckoutFlow::select_address`] runs a whole calculation; the split
//! [`begin_shipping`](CheckoutFlow::begin_shipping) /
//! [`fetch_quote`](CheckoutFlow::fetch_quote) /
//! [`apply_quote`](CheckoutFlow::apply_quote) steps let callers run several
//! calculations concurrently.
//!
//! # Submission
//!
//! [`CheckoutFlow::submit`] checks every precondition locally first; a missing
//! address, payment method, quote or cart aborts with no network call. A
//! backend failure returns the flow to `ShippingReady` so the customer can
//! retry.

mod state;

pub use state::{
    CheckoutSnapshot, OrderSummary, Phase, ShippingRequest, ShippingState, ShippingUpdate,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kiln_core::{AddressId, PaymentMethod, PostalCode};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::addresses::{AddressApi, AddressDraft, AddressError};
use crate::api::ApiError;
use crate::cart::CartStore;
use crate::error::add_breadcrumb;
use crate::notice::Notice;
use crate::orders::{EntityRef, NewOrder, NewOrderItem, Order, OrderApi};
use crate::pages::Route;
use crate::shipping::{Parcel, ShippingError, ShippingOption, ShippingQuoter};
use state::CheckoutState;

/// Errors returned by checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("no delivery address selected")]
    MissingAddress,

    #[error("no payment method selected")]
    MissingPayment,

    #[error("shipping cost is not available")]
    ShippingNotReady,

    #[error("cart is empty")]
    EmptyCart,

    #[error("order is already being submitted")]
    AlreadySubmitting,

    #[error("address {0} is not in the address book")]
    UnknownAddress(AddressId),

    #[error("shipping option {0} does not exist")]
    UnknownShippingOption(usize),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("order submission failed: {0}")]
    Submission(#[source] ApiError),
}

impl CheckoutError {
    /// Message shown to the customer.
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            Self::MissingAddress | Self::MissingPayment => {
                Notice::warning("Please select an address and a payment method.")
            }
            Self::ShippingNotReady => {
                Notice::warning("Shipping cost has not been calculated yet or is unavailable.")
            }
            Self::EmptyCart => Notice::warning("No items in cart."),
            Self::AlreadySubmitting => Notice::info("Your order is being placed."),
            Self::UnknownAddress(_) => Notice::warning("Please select one of your saved addresses."),
            Self::UnknownShippingOption(_) => Notice::warning("Please select a shipping option."),
            Self::Address(AddressError::Validation(_)) => {
                Notice::error("Please correct the highlighted fields.")
            }
            Self::Address(_) => Notice::error("Could not load your addresses. Please try again."),
            Self::Submission(_) => Notice::error("Failed to place order. Please try again."),
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The created order, when the backend returned one.
    pub order: Option<Order>,
    /// Where to send the customer next.
    pub redirect: Route,
}

/// Checkout state machine for one checkout session.
pub struct CheckoutFlow {
    addresses: Arc<dyn AddressApi>,
    quoter: Arc<dyn ShippingQuoter>,
    orders: Arc<dyn OrderApi>,
    cart: Arc<CartStore>,
    parcel: Parcel,
    state: Mutex<CheckoutState>,
}

impl CheckoutFlow {
    #[must_use]
    pub fn new(
        addresses: Arc<dyn AddressApi>,
        quoter: Arc<dyn ShippingQuoter>,
        orders: Arc<dyn OrderApi>,
        cart: Arc<CartStore>,
        parcel: Parcel,
    ) -> Self {
        Self {
            addresses,
            quoter,
            orders,
            cart,
            parcel,
            state: Mutex::new(CheckoutState::new()),
        }
    }

    /// Current state for rendering.
    #[must_use]
    pub fn snapshot(&self) -> CheckoutSnapshot {
        let state = self.lock();
        CheckoutSnapshot {
            phase: state.phase,
            addresses: state.addresses.clone(),
            selected_address: state.selected_address,
            shipping_message: state.shipping.message(),
            shipping: state.shipping.clone(),
            payment: state.payment,
            summary: OrderSummary::new(self.cart.summary().subtotal, state.shipping.cost()),
            notice: state.notice.clone(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Subtotal, resolved shipping and total.
    #[must_use]
    pub fn summary(&self) -> OrderSummary {
        let shipping = self.lock().shipping.cost();
        OrderSummary::new(self.cart.summary().subtotal, shipping)
    }

    /// Fetch the address book and select an address.
    ///
    /// The current selection is kept if it is still present; otherwise the
    /// first address is selected. Selecting starts a shipping calculation.
    ///
    /// # Errors
    ///
    /// Returns an error if the address book cannot be fetched.
    #[instrument(skip(self))]
    pub async fn load_addresses(&self) -> Result<(), CheckoutError> {
        {
            let mut state = self.lock();
            if state.phase == Phase::Submitting {
                return Err(CheckoutError::AlreadySubmitting);
            }
            state.phase = Phase::LoadingAddresses;
        }

        let addresses = match self.addresses.list().await {
            Ok(addresses) => addresses,
            Err(e) => {
                let error = CheckoutError::Address(e);
                let mut state = self.lock();
                state.phase = state.resting_phase();
                state.notice = Some(error.notice());
                return Err(error);
            }
        };
        debug!(count = addresses.len(), "Loaded addresses");

        let selection = {
            let mut state = self.lock();
            let keep = state
                .selected_address
                .filter(|id| addresses.iter().any(|a| a.id == Some(*id)));
            let selection = keep.or_else(|| addresses.iter().find_map(|a| a.id));
            state.addresses = addresses;
            state.phase = Phase::AddressesLoaded;
            if selection.is_none() {
                state.selected_address = None;
                state.shipping = ShippingState::Idle;
            }
            selection
        };

        if let Some(id) = selection {
            self.select_address(id).await?;
        }
        Ok(())
    }

    /// Select a delivery address and quote shipping to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is unknown or an order is being
    /// submitted. Carrier failures are not errors; they leave the shipping
    /// state unavailable.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn select_address(&self, id: AddressId) -> Result<ShippingUpdate, CheckoutError> {
        let request = self.begin_shipping(id)?;
        let result = self.fetch_quote(&request).await;
        Ok(self.apply_quote(&request, result))
    }

    /// Record an address selection and issue a new shipping token.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is unknown or an order is being
    /// submitted.
    pub fn begin_shipping(&self, id: AddressId) -> Result<ShippingRequest, CheckoutError> {
        let mut state = self.lock();
        if state.phase == Phase::Submitting {
            return Err(CheckoutError::AlreadySubmitting);
        }
        let zip = state
            .address(id)
            .map(|a| a.zip.clone())
            .ok_or(CheckoutError::UnknownAddress(id))?;

        state.latest_token += 1;
        let token = state.latest_token;
        state.selected_address = Some(id);
        state.shipping = ShippingState::Calculating { token };
        state.phase = Phase::ShippingCalculating;
        state.notice = None;
        debug!(token, "Started shipping calculation");

        Ok(ShippingRequest {
            token,
            address_id: id,
            zip,
        })
    }

    /// Ask the carrier for quotes. Does not touch the checkout state.
    ///
    /// # Errors
    ///
    /// Returns the carrier error, or [`ShippingError::InvalidDestination`]
    /// when the address has no valid postal code.
    pub async fn fetch_quote(
        &self,
        request: &ShippingRequest,
    ) -> Result<Vec<ShippingOption>, ShippingError> {
        let destination = PostalCode::parse(&request.zip)
            .map_err(|_| ShippingError::InvalidDestination(request.zip.clone()))?;
        let units = u32::try_from(self.cart.summary().item_count).unwrap_or(u32::MAX);
        let parcels = [self.parcel.clone().with_quantity(units)];
        self.quoter.quote(&destination, &parcels).await
    }

    /// Apply a quote result if it belongs to the latest calculation.
    pub fn apply_quote(
        &self,
        request: &ShippingRequest,
        result: Result<Vec<ShippingOption>, ShippingError>,
    ) -> ShippingUpdate {
        let mut state = self.lock();
        if request.token != state.latest_token {
            debug!(
                token = request.token,
                latest = state.latest_token,
                "Discarding stale shipping quote"
            );
            return ShippingUpdate::Stale;
        }

        state.shipping = match result {
            Ok(options) if !options.is_empty() => ShippingState::Ready {
                options,
                selected: 0,
            },
            Ok(_) => ShippingState::Unavailable {
                reason: ShippingError::Unavailable.to_string(),
            },
            Err(e) => {
                warn!(error = %e, address_id = %request.address_id, "Shipping quote unavailable");
                ShippingState::Unavailable {
                    reason: e.to_string(),
                }
            }
        };
        state.phase = state.resting_phase();
        ShippingUpdate::Applied
    }

    /// Choose another of the quoted options.
    ///
    /// # Errors
    ///
    /// Returns an error if no quote is resolved or the index is out of range.
    pub fn select_shipping_option(&self, index: usize) -> Result<(), CheckoutError> {
        let mut state = self.lock();
        match &mut state.shipping {
            ShippingState::Ready { options, selected } if index < options.len() => {
                *selected = index;
                Ok(())
            }
            ShippingState::Ready { .. } => Err(CheckoutError::UnknownShippingOption(index)),
            _ => Err(CheckoutError::ShippingNotReady),
        }
    }

    pub fn select_payment(&self, method: PaymentMethod) {
        let mut state = self.lock();
        state.payment = Some(method);
        state.notice = None;
    }

    /// Validate and save a new address, then reload the address book.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Validation`] (wrapped) with per-field messages,
    /// or the backend error.
    #[instrument(skip(self, draft))]
    pub async fn add_address(&self, draft: &AddressDraft) -> Result<(), CheckoutError> {
        let address = draft.validate().map_err(AddressError::Validation)?;
        self.addresses.create(&address).await?;
        info!("Address added during checkout");
        self.load_addresses().await
    }

    /// Place the order.
    ///
    /// # Errors
    ///
    /// Returns a precondition error without any network call, or
    /// [`CheckoutError::Submission`] when the backend refuses the order.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<SubmitOutcome, CheckoutError> {
        let order = {
            let mut state = self.lock();
            match self.prepare_order(&state) {
                Ok(order) => {
                    state.phase = Phase::Submitting;
                    state.notice = None;
                    order
                }
                Err(e) => {
                    debug!(reason = %e, "Order not submitted");
                    if !matches!(e, CheckoutError::AlreadySubmitting) {
                        state.notice = Some(e.notice());
                    }
                    return Err(e);
                }
            }
        };

        add_breadcrumb("checkout", "Submitting order", None);
        match self.orders.submit(&order).await {
            Ok(created) => {
                if let Err(e) = self.cart.clear() {
                    warn!(error = %e, "Order placed but the cart could not be cleared");
                }
                let mut state = self.lock();
                state.phase = Phase::Succeeded;
                state.notice = Some(Notice::success("Order placed successfully!"));
                info!(order_id = ?created.as_ref().map(|o| o.id), "Order placed");
                Ok(SubmitOutcome {
                    order: created,
                    redirect: Route::OrderHistory,
                })
            }
            Err(e) => {
                let error = CheckoutError::Submission(e);
                let mut state = self.lock();
                state.phase = Phase::ShippingReady;
                state.notice = Some(error.notice());
                warn!(error = %error, "Order submission failed");
                Err(error)
            }
        }
    }

    /// Check the preconditions and build the order body.
    fn prepare_order(&self, state: &CheckoutState) -> Result<NewOrder, CheckoutError> {
        if state.phase == Phase::Submitting {
            return Err(CheckoutError::AlreadySubmitting);
        }
        let address = state
            .selected_address
            .filter(|id| state.address(*id).is_some())
            .ok_or(CheckoutError::MissingAddress)?;
        let payment = state.payment.ok_or(CheckoutError::MissingPayment)?;
        let shipping = state.shipping.cost().ok_or(CheckoutError::ShippingNotReady)?;

        let items: Vec<NewOrderItem> = self
            .cart
            .items()
            .into_iter()
            .map(|item| NewOrderItem {
                product: EntityRef::new(item.id),
                quantity: item.quantity,
            })
            .collect();
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        Ok(NewOrder {
            shipping,
            payment,
            address: EntityRef::new(address),
            items,
        })
    }

    fn lock(&self) -> MutexGuard<'_, CheckoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
