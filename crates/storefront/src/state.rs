//! Storefront wiring.
//!
//! [`Storefront`] owns one instance of every client, built from a
//! [`StorefrontConfig`], and hands out page view models that share them.

use std::sync::Arc;

use tracing::info;

use crate::addresses::{AddressClient, PostalLookupClient};
use crate::api::{ApiClient, ApiError};
use crate::auth::{AuthClient, UserClient};
use crate::cart::CartStore;
use crate::catalog::CatalogClient;
use crate::checkout::CheckoutFlow;
use crate::config::StorefrontConfig;
use crate::error::StorefrontError;
use crate::orders::OrderClient;
use crate::pages::{AccountPage, CartPage, ProductListPage};
use crate::shipping::ShippingClient;
use crate::storage::{FileStorage, KeyValueStorage};

/// Every storefront client, sharing one session.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    storage: Arc<dyn KeyValueStorage>,
    api: ApiClient,
    cart: Arc<CartStore>,
    catalog: CatalogClient,
    addresses: AddressClient,
    postal: PostalLookupClient,
    shipping: ShippingClient,
    orders: OrderClient,
    auth: AuthClient,
    users: UserClient,
}

impl Storefront {
    /// Build the storefront with file storage under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or an HTTP
    /// client fails to build.
    pub fn new(config: StorefrontConfig) -> Result<Self, StorefrontError> {
        let storage = Arc::new(FileStorage::open(&config.data_dir)?);
        Self::with_storage(config, storage)
    }

    /// Build the storefront on the given storage.
    ///
    /// A session token found in storage is restored.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client fails to build.
    pub fn with_storage(
        config: StorefrontConfig,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, StorefrontError> {
        let api = ApiClient::new(config.api_url.clone(), config.http_timeout)?;
        let postal = PostalLookupClient::new(config.postal_lookup_url.clone(), config.http_timeout)
            .map_err(ApiError::from)?;
        let shipping = ShippingClient::new(config.shipping.clone(), config.http_timeout)?;

        let auth = AuthClient::new(api.clone(), storage.clone());
        let restored = auth.restore();
        let cart = Arc::new(CartStore::new(storage.clone()));
        info!(
            api_url = %config.api_url,
            session_restored = restored,
            cart_lines = cart.summary().line_count,
            "Storefront ready"
        );

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                catalog: CatalogClient::new(api.clone()),
                addresses: AddressClient::new(api.clone()),
                orders: OrderClient::new(api.clone()),
                users: UserClient::new(api.clone()),
                config,
                storage,
                api,
                cart,
                postal,
                shipping,
                auth,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.inner.storage
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn cart(&self) -> &Arc<CartStore> {
        &self.inner.cart
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogClient {
        &self.inner.catalog
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressClient {
        &self.inner.addresses
    }

    #[must_use]
    pub fn postal_lookup(&self) -> &PostalLookupClient {
        &self.inner.postal
    }

    #[must_use]
    pub fn shipping(&self) -> &ShippingClient {
        &self.inner.shipping
    }

    #[must_use]
    pub fn orders(&self) -> &OrderClient {
        &self.inner.orders
    }

    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    #[must_use]
    pub fn users(&self) -> &UserClient {
        &self.inner.users
    }

    /// Start a checkout session over the current cart.
    #[must_use]
    pub fn checkout(&self) -> CheckoutFlow {
        CheckoutFlow::new(
            Arc::new(self.inner.addresses.clone()),
            Arc::new(self.inner.shipping.clone()),
            Arc::new(self.inner.orders.clone()),
            self.inner.cart.clone(),
            self.inner.shipping.default_parcel(),
        )
    }

    #[must_use]
    pub fn cart_page(&self) -> CartPage {
        CartPage::new(
            self.inner.cart.clone(),
            Arc::new(self.inner.shipping.clone()),
            self.inner.shipping.default_parcel(),
        )
    }

    #[must_use]
    pub fn account_page(&self) -> AccountPage {
        AccountPage::new(
            Arc::new(self.inner.addresses.clone()),
            Arc::new(self.inner.orders.clone()),
        )
    }

    #[must_use]
    pub fn product_list(&self) -> ProductListPage {
        ProductListPage::new(self.inner.catalog.clone(), self.inner.cart.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, keys};
    use std::collections::HashMap;

    fn config(dir: &std::path::Path) -> StorefrontConfig {
        let map: HashMap<&str, String> = [
            ("KILN_API_URL", "http://127.0.0.1:9".to_string()),
            ("KILN_DATA_DIR", dir.display().to_string()),
        ]
        .into_iter()
        .collect();
        StorefrontConfig::from_source(|key| map.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_restores_session_and_cart() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryStorage::with_entry(keys::TOKEN, "tok"));
        storage
            .set(keys::CART, r#"[{"id":1,"title":"Vaso","price":12}]"#)
            .unwrap();

        let storefront = Storefront::with_storage(config(dir.path()), storage).unwrap();
        assert!(storefront.auth().is_authenticated());
        assert_eq!(storefront.cart().summary().item_count, 1);
        assert!(storefront.cart_page().view().lines.len() == 1);
    }

    #[test]
    fn test_file_storage_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storefront = Storefront::new(config(&dir.path().join("state"))).unwrap();
        assert!(!storefront.auth().is_authenticated());
        assert!(dir.path().join("state").is_dir());
    }
}
