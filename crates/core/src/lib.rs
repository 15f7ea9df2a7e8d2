//! Kiln Core - Shared domain types for the ceramics storefront.
//!
//! This crate provides the value types used by every other Kiln crate:
//! - `storefront` - Cart, catalog, address, shipping and checkout clients
//! - `integration-tests` - End-to-end tests against a mock backend
//!
//! # Architecture
//!
//! The core crate contains only types and their validation rules. No I/O,
//! no HTTP clients, no storage. This keeps it lightweight and lets every
//! invariant (minimum quantity, postal code shape, decimal money) be tested
//! in isolation.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, money, quantities, postal codes, emails and
//!   payment methods

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
