//! Core types for Kiln.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod payment;
pub mod postal_code;
pub mod quantity;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use payment::{PaymentMethod, UnknownPaymentMethod};
pub use postal_code::{PostalCode, PostalCodeError};
pub use quantity::Quantity;
