//! Product listings and the cart page against the mock backend.

#![allow(clippy::unwrap_used)]

use kiln_core::{CategoryId, Money, ProductId};
use kiln_integration_tests::MockBackend;
use kiln_storefront::notice::NoticeLevel;
use kiln_storefront::pages::{FlatRate, Route, ShippingEstimate};
use kiln_storefront::shipping::ShippingError;
use kiln_storefront::storage::{KeyValueStorage, keys};

// =============================================================================
// Listings
// =============================================================================

#[tokio::test]
async fn test_all_products_listing() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    let view = storefront.product_list().load(None).await.unwrap();
    assert_eq!(view.heading, "All Products");
    assert_eq!(view.products.len(), 5);
    assert_eq!(view.products[0].price, "$19.90");
    assert_eq!(view.categories.len(), 2);
    assert!(view.products.iter().all(|card| !card.in_cart));
}

#[tokio::test]
async fn test_category_listing() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    let view = storefront
        .product_list()
        .load(Some(CategoryId::new(2)))
        .await
        .unwrap();
    assert_eq!(view.heading, "Products in Category 2");
    let ids: Vec<i64> = view.products.iter().map(|card| card.id.as_i64()).collect();
    assert_eq!(ids, vec![4, 5]);
}

#[tokio::test]
async fn test_paged_listing() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    let listing = storefront.product_list();

    let first = listing.load_page(0).await.unwrap();
    assert_eq!(first.products.len(), 3);
    assert_eq!(first.page, Some(0));
    assert!(first.has_next);
    assert!(!first.has_previous);

    let second = listing.load_page(1).await.unwrap();
    assert_eq!(second.products.len(), 2);
    assert!(!second.has_next);
    assert!(second.has_previous);
}

#[tokio::test]
async fn test_catalog_responses_are_cached() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    let catalog = storefront.catalog();

    catalog.products().await.unwrap();
    catalog.products().await.unwrap();
    catalog.product(ProductId::new(2)).await.unwrap();
    catalog.product(ProductId::new(2)).await.unwrap();
    assert_eq!(backend.count("GET", "/products"), 1);
    assert_eq!(backend.count("GET", "/products/2"), 1);

    catalog.invalidate();
    catalog.products().await.unwrap();
    assert_eq!(backend.count("GET", "/products"), 2);
}

#[tokio::test]
async fn test_missing_product_is_not_found() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    let err = storefront
        .catalog()
        .product(ProductId::new(42))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let notice = storefront.product_list().add_to_cart(ProductId::new(42)).await;
    assert!(notice.is_error());
    assert!(storefront.cart().is_empty());
}

// =============================================================================
// Adding to the cart
// =============================================================================

#[tokio::test]
async fn test_add_to_cart_twice_warns() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    let listing = storefront.product_list();

    let first = listing.add_to_cart(ProductId::new(3)).await;
    assert_eq!(first.title, "Product added");
    assert_eq!(first.level, NoticeLevel::Success);

    let second = listing.add_to_cart(ProductId::new(3)).await;
    assert_eq!(second.title, "Product already in cart");
    assert_eq!(second.level, NoticeLevel::Warning);

    assert_eq!(storefront.cart().summary().line_count, 1);
    let view = listing.load(None).await.unwrap();
    assert!(view.products.iter().any(|card| card.id == ProductId::new(3) && card.in_cart));
}

#[tokio::test]
async fn test_cart_survives_restart() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront.product_list().add_to_cart(ProductId::new(1)).await;
    storefront.cart_page().increment(ProductId::new(1)).unwrap();

    let reopened = backend.storefront_with(storefront.storage().clone());
    let items = reopened.cart().items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity.get(), 2);
    assert!(storefront.storage().get(keys::CART).unwrap().is_some());
}

// =============================================================================
// Cart page
// =============================================================================

#[tokio::test]
async fn test_cart_page_quantities_and_totals() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    let listing = storefront.product_list();
    listing.add_to_cart(ProductId::new(1)).await;
    listing.add_to_cart(ProductId::new(2)).await;

    let page = storefront.cart_page();
    page.set_quantity_input(ProductId::new(2), "3").unwrap();
    page.decrement(ProductId::new(1)).unwrap();

    let view = page.view();
    assert_eq!(view.item_count, 4);
    assert_eq!(view.subtotal, "$109.60");
    assert!(!view.lines[0].can_decrement);
    assert!(view.lines[1].can_decrement);
    assert_eq!(view.lines[1].line_total, "$89.70");
    assert_eq!(view.shipping, None);
    assert_eq!(view.total, "$109.60");

    page.set_quantity_input(ProductId::new(2), "-5").unwrap();
    assert_eq!(page.view().lines[1].quantity, 1);

    page.remove(ProductId::new(1)).unwrap();
    assert_eq!(page.view().lines.len(), 1);
}

#[tokio::test]
async fn test_cart_page_flat_rate() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront.product_list().add_to_cart(ProductId::new(1)).await;

    let page = storefront.cart_page();
    page.select_flat_rate(FlatRate::Express);

    let view = page.view();
    assert_eq!(view.shipping.as_deref(), Some("$10.00"));
    assert_eq!(view.shipping_message, "Express Delivery - $10.00");
    assert_eq!(view.total, "$29.90");
}

#[tokio::test]
async fn test_cart_page_quotes_cheapest_option() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront.product_list().add_to_cart(ProductId::new(1)).await;

    let page = storefront.cart_page();
    let option = page.estimate_for_postal_code("20040-002").await.unwrap();
    assert_eq!(option.name, "PAC");
    assert_eq!(option.price, Money::from_cents(2000));

    let view = page.view();
    assert_eq!(view.shipping.as_deref(), Some("$20.00"));
    assert_eq!(view.shipping_message, "PAC (Correios) - $20.00, 8 days");
    assert_eq!(view.total, "$39.90");
}

#[tokio::test]
async fn test_cart_page_unavailable_destination() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront.product_list().add_to_cart(ProductId::new(1)).await;
    let page = storefront.cart_page();

    let err = page.estimate_for_postal_code("01001-000").await.unwrap_err();
    assert!(matches!(err, ShippingError::Unavailable));
    assert!(matches!(page.estimate(), ShippingEstimate::Unavailable { .. }));
    assert_eq!(page.view().shipping_message, "Frete indisponível");

    let err = page.estimate_for_postal_code("0100").await.unwrap_err();
    assert!(matches!(err, ShippingError::InvalidDestination(_)));
    assert_eq!(backend.shipments().len(), 1);
}

#[tokio::test]
async fn test_checkout_button_sends_guest_to_login() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront.product_list().add_to_cart(ProductId::new(1)).await;

    let route = storefront.cart_page().checkout(storefront.auth()).unwrap();
    assert_eq!(route, Route::Login);
    assert_eq!(
        storefront.storage().get(keys::LAST_PAGE).unwrap().as_deref(),
        Some("/checkout")
    );
}
