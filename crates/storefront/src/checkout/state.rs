//! Checkout state machine types.

use kiln_core::{AddressId, Money, PaymentMethod};
use serde::Serialize;

use crate::addresses::Address;
use crate::notice::Notice;
use crate::shipping::{ShippingOption, UNAVAILABLE_MESSAGE, quote_message};

/// Where the checkout currently is.
///
/// ```text
/// LoadingAddresses -> AddressesLoaded -> ShippingCalculating <-> ShippingReady
///                                                                     |
///                               ShippingReady <- (failure) Submitting -+-> Succeeded
/// ```
///
/// A quote that comes back unavailable leaves the flow in `AddressesLoaded`
/// until another address is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoadingAddresses,
    AddressesLoaded,
    ShippingCalculating,
    ShippingReady,
    Submitting,
    Succeeded,
}

/// Shipping quote for the selected address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ShippingState {
    /// No address selected yet.
    Idle,
    /// A quote is in flight.
    Calculating { token: u64 },
    /// Quotes received; `selected` indexes into `options`.
    Ready {
        options: Vec<ShippingOption>,
        selected: usize,
    },
    /// The carrier could not quote this destination.
    Unavailable { reason: String },
}

impl ShippingState {
    /// Price of the chosen option, when one is resolved.
    #[must_use]
    pub fn cost(&self) -> Option<Money> {
        match self {
            Self::Ready { options, selected } => options.get(*selected).map(|o| o.price),
            _ => None,
        }
    }

    #[must_use]
    pub fn selected_option(&self) -> Option<&ShippingOption> {
        match self {
            Self::Ready { options, selected } => options.get(*selected),
            _ => None,
        }
    }

    /// Text shown next to the shipping line.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Idle => None,
            Self::Calculating { .. } => Some("Calculating shipping...".to_string()),
            Self::Ready { options, .. } => Some(quote_message(options)),
            Self::Unavailable { .. } => Some(UNAVAILABLE_MESSAGE.to_string()),
        }
    }
}

/// A shipping calculation that has been started.
///
/// The token identifies the calculation; only the response carrying the most
/// recently issued token is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingRequest {
    pub token: u64,
    pub address_id: AddressId,
    pub zip: String,
}

/// What happened to a quote response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShippingUpdate {
    /// The response belonged to the latest request and is now shown.
    Applied,
    /// A newer request superseded it; it was dropped.
    Stale,
}

/// Subtotal, shipping and total for the order being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub subtotal: Money,
    /// `None` until a quote is resolved.
    pub shipping: Option<Money>,
    pub total: Money,
}

impl OrderSummary {
    #[must_use]
    pub fn new(subtotal: Money, shipping: Option<Money>) -> Self {
        Self {
            subtotal,
            shipping,
            total: subtotal + shipping.unwrap_or(Money::ZERO),
        }
    }
}

/// Read-only copy of the checkout for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSnapshot {
    pub phase: Phase,
    pub addresses: Vec<Address>,
    pub selected_address: Option<AddressId>,
    pub shipping: ShippingState,
    pub shipping_message: Option<String>,
    pub payment: Option<PaymentMethod>,
    pub summary: OrderSummary,
    pub notice: Option<Notice>,
}

/// Mutable checkout state, guarded by the flow's mutex.
#[derive(Debug)]
pub(super) struct CheckoutState {
    pub(super) phase: Phase,
    pub(super) addresses: Vec<Address>,
    pub(super) selected_address: Option<AddressId>,
    pub(super) shipping: ShippingState,
    pub(super) payment: Option<PaymentMethod>,
    pub(super) notice: Option<Notice>,
    /// Last issued shipping token.
    pub(super) latest_token: u64,
}

impl CheckoutState {
    pub(super) const fn new() -> Self {
        Self {
            phase: Phase::LoadingAddresses,
            addresses: Vec::new(),
            selected_address: None,
            shipping: ShippingState::Idle,
            payment: None,
            notice: None,
            latest_token: 0,
        }
    }

    pub(super) fn address(&self, id: AddressId) -> Option<&Address> {
        self.addresses.iter().find(|a| a.id == Some(id))
    }

    /// Phase to settle in once nothing is in flight.
    pub(super) fn resting_phase(&self) -> Phase {
        match self.shipping {
            ShippingState::Ready { .. } => Phase::ShippingReady,
            ShippingState::Calculating { .. } => Phase::ShippingCalculating,
            ShippingState::Idle | ShippingState::Unavailable { .. } => Phase::AddressesLoaded,
        }
    }
}
