//! Payment method labels.
//!
//! Payment is not processed by the storefront; the selected method travels
//! to the backend as a plain label on the order.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Returned when a label does not name a supported payment method.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown payment method: {0}")]
pub struct UnknownPaymentMethod(pub String);

/// Payment methods offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "credit card")]
    CreditCard,
    #[serde(rename = "paypal")]
    Paypal,
    #[serde(rename = "bank transfer")]
    BankTransfer,
}

impl PaymentMethod {
    /// All methods in the order they are offered.
    pub const ALL: [Self; 3] = [Self::CreditCard, Self::Paypal, Self::BankTransfer];

    /// Wire label sent to the backend.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CreditCard => "credit card",
            Self::Paypal => "paypal",
            Self::BankTransfer => "bank transfer",
        }
    }

    /// Human-readable name for selectors.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::CreditCard => "Credit Card",
            Self::Paypal => "PayPal",
            Self::BankTransfer => "Bank Transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownPaymentMethod(s.to_string()))
    }
}
