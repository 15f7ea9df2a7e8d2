//! Kiln storefront library.
//!
//! Client side of a handcrafted-ceramics shop: a persisted cart, catalog
//! browsing, the address book, carrier shipping quotes, checkout and order
//! history. Persistence, authentication and pricing live in the shop backend;
//! this crate holds the cart state, the checkout state machine and the
//! clients for the backend, the postal lookup service and the carrier.
//!
//! Start from [`state::Storefront`], which wires every client from a
//! [`config::StorefrontConfig`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod addresses;
pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod notice;
pub mod orders;
pub mod pages;
pub mod shipping;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod validation;

pub use error::{Result, StorefrontError};
pub use state::Storefront;
