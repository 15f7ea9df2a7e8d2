//! Product catalog client.
//!
//! Wraps the backend's `/products` and `/categories` resources. Listing and
//! detail responses are cached in memory via `moka` (5 minute TTL); the
//! catalog changes rarely and every page of the storefront reads it.

use std::time::Duration;

use kiln_core::{CategoryId, Money, ProductId};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::api::{ApiClient, ApiError};

/// Products per page on the paged listing.
pub const PAGE_SIZE: u32 = 3;

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: u64 = 1000;

/// Product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CategoryId>,
    pub name: String,
}

/// A ceramic piece for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub text: String,
    /// Main image URL.
    #[serde(default)]
    pub img: String,
    pub price: Money,
    /// Installment plan text shown under the price.
    #[serde(default)]
    pub installment: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub width: String,
    #[serde(default)]
    pub recommended_environment: String,
    #[serde(default)]
    pub recommended_for_plants: String,
    #[serde(default)]
    pub img1: String,
    #[serde(default)]
    pub img2: String,
    #[serde(default)]
    pub img3: String,
    #[serde(default)]
    pub category: Option<Category>,
}

impl Product {
    /// Gallery images in display order, skipping blanks.
    #[must_use]
    pub fn gallery(&self) -> Vec<&str> {
        [&self.img, &self.img1, &self.img2, &self.img3]
            .into_iter()
            .map(String::as_str)
            .filter(|url| !url.is_empty())
            .collect()
    }
}

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_elements: u64,
    /// Zero-based page index.
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.number + 1 < self.total_pages
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.number > 0
    }
}

/// Cache key for catalog responses.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Products,
    ProductPage(u32),
    Product(ProductId),
    Category(CategoryId),
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Products(Vec<Product>),
    ProductPage(Page<Product>),
    Product(Box<Product>),
    Categories(Vec<Category>),
}

/// Client for catalog endpoints.
#[derive(Clone)]
pub struct CatalogClient {
    api: ApiClient,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogClient {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Self { api, cache }
    }

    /// All products.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<Vec<Product>, ApiError> {
        if let Some(CacheValue::Products(products)) = self.cache.get(&CacheKey::Products).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products: Vec<Product> = self.api.get("/products").await?;
        self.cache
            .insert(CacheKey::Products, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// One page of products, [`PAGE_SIZE`] per page.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products_page(&self, page: u32) -> Result<Page<Product>, ApiError> {
        let key = CacheKey::ProductPage(page);
        if let Some(CacheValue::ProductPage(cached)) = self.cache.get(&key).await {
            debug!("Cache hit for product page");
            return Ok(cached);
        }

        let path = format!("/products/page?page={page}&size={PAGE_SIZE}");
        let result: Page<Product> = self.api.get(&path).await?;
        self.cache
            .insert(key, CacheValue::ProductPage(result.clone()))
            .await;
        Ok(result)
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns an error if the product does not exist or the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ApiError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self.api.get(&format!("/products/{id}")).await?;
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Products in a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn products_by_category(&self, id: CategoryId) -> Result<Vec<Product>, ApiError> {
        let key = CacheKey::Category(id);
        if let Some(CacheValue::Products(products)) = self.cache.get(&key).await {
            debug!("Cache hit for category products");
            return Ok(products);
        }

        let products: Vec<Product> = self.api.get(&format!("/products/category/{id}")).await?;
        self.cache
            .insert(key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// All categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache.get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self.api.get("/categories").await?;
        self.cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(categories.clone()),
            )
            .await;
        Ok(categories)
    }

    /// Drop every cached response.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}
