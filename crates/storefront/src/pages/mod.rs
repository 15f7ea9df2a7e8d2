//! Page view models.
//!
//! Each page wraps the clients it needs and exposes plain, serializable views
//! plus the actions its controls trigger. Navigation is expressed as a
//! [`Route`] returned from actions; the presentation layer performs it.

mod account;
mod cart;
mod product_list;

pub use account::{AccountPage, OrderLineView, OrderView};
pub use cart::{CartLineView, CartPage, CartView, FlatRate, ShippingEstimate};
pub use product_list::{ProductCard, ProductListPage, ProductListView};

use kiln_core::{CategoryId, ProductId};
use serde::Serialize;

use crate::cart::{CartError, CartItem, CartStore};
use crate::catalog::Product;
use crate::notice::Notice;

/// Storefront routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Home,
    Login,
    Signup,
    Cart,
    Checkout,
    Account,
    /// Order history tab of the account page.
    OrderHistory,
    Products,
    Category(CategoryId),
    Product(ProductId),
}

impl Route {
    /// Path (and fragment) of the route.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Login => "/login".to_string(),
            Self::Signup => "/signup".to_string(),
            Self::Cart => "/cart".to_string(),
            Self::Checkout => "/checkout".to_string(),
            Self::Account => "/user".to_string(),
            Self::OrderHistory => "/user#tab3".to_string(),
            Self::Products => "/products".to_string(),
            Self::Category(id) => format!("/products/category/{id}"),
            Self::Product(id) => format!("/product/{id}"),
        }
    }

    /// Parse a stored path back into a route.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim();
        let route = match path {
            "/" | "/home" => Self::Home,
            "/login" => Self::Login,
            "/signup" => Self::Signup,
            "/cart" => Self::Cart,
            "/checkout" => Self::Checkout,
            "/user" => Self::Account,
            "/user#tab3" => Self::OrderHistory,
            "/products" => Self::Products,
            _ => {
                if let Some(id) = path.strip_prefix("/products/category/") {
                    Self::Category(id.parse().ok()?)
                } else if let Some(id) = path.strip_prefix("/product/") {
                    Self::Product(id.parse().ok()?)
                } else {
                    return None;
                }
            }
        };
        Some(route)
    }

    /// Whether the route needs a signed-in customer.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::Checkout | Self::Account | Self::OrderHistory
        )
    }
}

/// Add a product from a listing or detail page, returning the toast to show.
pub fn add_to_cart(cart: &CartStore, product: &Product) -> Notice {
    match cart.add(CartItem::from(product)) {
        Ok(_) => Notice::success("Product added")
            .with_description("This product was added to your cart."),
        Err(CartError::AlreadyInCart(_)) => Notice::warning("Product already in cart")
            .with_description("This product is already added to your cart."),
        Err(e) => {
            tracing::error!(error = %e, "Failed to add product to cart");
            Notice::error("Error").with_description("Could not update your cart. Please try again.")
        }
    }
}
