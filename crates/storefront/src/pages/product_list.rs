//! Product listing pages.

use std::sync::Arc;

use kiln_core::{CategoryId, ProductId};
use serde::Serialize;
use tracing::{instrument, warn};

use super::add_to_cart;
use crate::api::ApiError;
use crate::cart::CartStore;
use crate::catalog::{CatalogClient, Category, Product};
use crate::notice::Notice;

/// A product tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductCard {
    pub id: ProductId,
    pub title: String,
    pub img: String,
    pub price: String,
    pub installment: String,
    pub in_cart: bool,
}

/// A rendered listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductListView {
    pub heading: String,
    pub products: Vec<ProductCard>,
    pub categories: Vec<Category>,
    /// Zero-based page index for paged listings.
    pub page: Option<u32>,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Listing of all products, one category, or one page.
pub struct ProductListPage {
    catalog: CatalogClient,
    cart: Arc<CartStore>,
}

impl ProductListPage {
    #[must_use]
    pub const fn new(catalog: CatalogClient, cart: Arc<CartStore>) -> Self {
        Self { catalog, cart }
    }

    /// All products, or those of one category.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    #[instrument(skip(self))]
    pub async fn load(&self, category: Option<CategoryId>) -> Result<ProductListView, ApiError> {
        let (heading, products) = match category {
            Some(id) => (
                format!("Products in Category {id}"),
                self.catalog.products_by_category(id).await?,
            ),
            None => ("All Products".to_string(), self.catalog.products().await?),
        };
        Ok(ProductListView {
            heading,
            products: self.cards(&products),
            categories: self.categories().await,
            page: None,
            has_next: false,
            has_previous: false,
        })
    }

    /// One page of the paged listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be loaded.
    #[instrument(skip(self))]
    pub async fn load_page(&self, page: u32) -> Result<ProductListView, ApiError> {
        let result = self.catalog.products_page(page).await?;
        Ok(ProductListView {
            heading: "All Products".to_string(),
            products: self.cards(&result.content),
            categories: self.categories().await,
            page: Some(result.number),
            has_next: result.has_next(),
            has_previous: result.has_previous(),
        })
    }

    /// Add a product by id, returning the toast to show.
    pub async fn add_to_cart(&self, id: ProductId) -> Notice {
        match self.catalog.product(id).await {
            Ok(product) => add_to_cart(&self.cart, &product),
            Err(e) => {
                warn!(error = %e, product_id = %id, "Failed to load product for cart");
                Notice::error("Error").with_description("Failed to load products. Please try again later.")
            }
        }
    }

    /// Category menu; a failure only hides the menu.
    async fn categories(&self) -> Vec<Category> {
        self.catalog.categories().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load categories");
            Vec::new()
        })
    }

    fn cards(&self, products: &[Product]) -> Vec<ProductCard> {
        let in_cart: Vec<ProductId> = self.cart.items().iter().map(|item| item.id).collect();
        products
            .iter()
            .map(|product| ProductCard {
                id: product.id,
                title: product.title.clone(),
                img: product.img.clone(),
                price: product.price.to_string(),
                installment: product.installment.clone(),
                in_cart: in_cart.contains(&product.id),
            })
            .collect()
    }
}
