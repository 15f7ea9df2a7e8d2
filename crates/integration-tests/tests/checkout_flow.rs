//! Checkout against the mock backend.
//!
//! Covers the full path from cart to placed order, the local preconditions
//! that must hold before anything is sent, carrier failures, and the rule
//! that only the latest shipping calculation is applied.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use kiln_core::{AddressId, Money, PaymentMethod, ProductId};
use kiln_integration_tests::{CUSTOMER_EMAIL, CUSTOMER_PASSWORD, MockBackend};
use kiln_storefront::Storefront;
use kiln_storefront::addresses::AddressDraft;
use kiln_storefront::auth::Credentials;
use kiln_storefront::checkout::{CheckoutError, Phase, ShippingState, ShippingUpdate};
use kiln_storefront::pages::Route;
use secrecy::SecretString;

// =============================================================================
// Helper Functions
// =============================================================================

async fn signed_in(backend: &MockBackend) -> Storefront {
    let storefront = backend.storefront();
    storefront
        .auth()
        .login(&Credentials {
            email: CUSTOMER_EMAIL.to_string(),
            password: SecretString::from(CUSTOMER_PASSWORD),
        })
        .await
        .unwrap();
    storefront
}

/// Two of product 1 ($19.90) and one of product 4 ($49.90).
async fn fill_cart(storefront: &Storefront) {
    let listing = storefront.product_list();
    listing.add_to_cart(ProductId::new(1)).await;
    listing.add_to_cart(ProductId::new(4)).await;
    storefront.cart_page().increment(ProductId::new(1)).unwrap();
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_checkout_places_order_and_clears_cart() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;
    fill_cart(&storefront).await;
    assert_eq!(storefront.cart().summary().item_count, 3);

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();

    let snapshot = checkout.snapshot();
    assert_eq!(snapshot.phase, Phase::ShippingReady);
    assert_eq!(snapshot.selected_address, Some(AddressId::new(1)));
    assert_eq!(
        snapshot.shipping_message.as_deref(),
        Some("PAC: $80.00 | SEDEX: $160.00")
    );
    assert_eq!(snapshot.summary.subtotal, Money::from_cents(8970));
    assert_eq!(snapshot.summary.total, Money::from_cents(16970));

    let shipments = backend.shipments();
    assert_eq!(shipments.len(), 1);
    assert_eq!(shipments[0]["to"]["postal_code"], "80010000");
    assert_eq!(shipments[0]["from"]["postal_code"], "85501560");
    assert_eq!(shipments[0]["products"][0]["quantity"], 3);

    checkout.select_shipping_option(1).unwrap();
    checkout.select_payment(PaymentMethod::Paypal);
    assert_eq!(checkout.summary().total, Money::from_cents(24970));

    let outcome = checkout.submit().await.unwrap();
    assert_eq!(outcome.redirect, Route::OrderHistory);
    assert_eq!(outcome.order.unwrap().status, "PENDING");
    assert_eq!(checkout.phase(), Phase::Succeeded);
    assert!(storefront.cart().is_empty());

    let submitted = backend.submitted_orders();
    assert_eq!(submitted.len(), 1);
    let body = &submitted[0];
    assert_eq!(body["payment"], "paypal");
    assert_eq!(body["address"]["id"], 1);
    assert_eq!(body["shipping"].as_f64(), Some(160.0));
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["product"]["id"], 1);
    assert_eq!(body["items"][0]["quantity"], 2);
}

#[tokio::test]
async fn test_order_shows_up_in_history() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;
    fill_cart(&storefront).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();
    checkout.select_payment(PaymentMethod::CreditCard);
    checkout.submit().await.unwrap();

    let orders = storefront.account_page().orders().await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].payment, "credit card");
    assert_eq!(orders[0].date, "01/06/2025");
    assert_eq!(orders[1].date, "15/01/2025");
}

// =============================================================================
// Preconditions
// =============================================================================

#[tokio::test]
async fn test_submit_without_payment_sends_nothing() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;
    fill_cart(&storefront).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();

    let err = checkout.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::MissingPayment));
    assert_eq!(
        checkout.snapshot().notice.unwrap().title,
        "Please select an address and a payment method."
    );
    assert_eq!(backend.count("POST", "/order"), 0);
    assert_eq!(storefront.cart().summary().item_count, 3);
}

#[tokio::test]
async fn test_submit_with_empty_cart_sends_nothing() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();
    checkout.select_payment(PaymentMethod::BankTransfer);

    let err = checkout.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(backend.count("POST", "/order"), 0);
}

#[tokio::test]
async fn test_unavailable_shipping_blocks_submission() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;
    fill_cart(&storefront).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();
    checkout.select_address(AddressId::new(3)).await.unwrap();

    let snapshot = checkout.snapshot();
    assert!(matches!(snapshot.shipping, ShippingState::Unavailable { .. }));
    assert_eq!(snapshot.shipping_message.as_deref(), Some("Frete indisponível"));
    assert_eq!(snapshot.summary.shipping, None);
    assert_eq!(snapshot.phase, Phase::AddressesLoaded);

    checkout.select_payment(PaymentMethod::Paypal);
    let err = checkout.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::ShippingNotReady));
    assert_eq!(backend.count("POST", "/order"), 0);
}

// =============================================================================
// Failures and retries
// =============================================================================

#[tokio::test]
async fn test_failed_submission_keeps_cart_and_allows_retry() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;
    fill_cart(&storefront).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();
    checkout.select_payment(PaymentMethod::Paypal);

    backend.fail_orders(true);
    let err = checkout.submit().await.unwrap_err();
    assert!(matches!(err, CheckoutError::Submission(_)));
    assert_eq!(checkout.phase(), Phase::ShippingReady);
    assert_eq!(storefront.cart().summary().item_count, 3);
    assert!(checkout.snapshot().notice.unwrap().is_error());

    backend.fail_orders(false);
    let outcome = checkout.submit().await.unwrap();
    assert_eq!(outcome.redirect, Route::OrderHistory);
    assert_eq!(backend.count("POST", "/order"), 2);
    assert!(storefront.cart().is_empty());
}

#[tokio::test]
async fn test_checkout_requires_session() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    let err = storefront.checkout().load_addresses().await.unwrap_err();
    match err {
        CheckoutError::Address(e) => assert!(e.to_string().contains("401")),
        other => panic!("unexpected error: {other:?}"),
    }
}

// =============================================================================
// Stale shipping quotes
// =============================================================================

#[tokio::test]
async fn test_slow_quote_for_previous_address_is_discarded() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;
    fill_cart(&storefront).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();
    backend.delay_quotes("20040002", Duration::from_millis(400));

    let (slow, fast) = tokio::join!(checkout.select_address(AddressId::new(2)), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        checkout.select_address(AddressId::new(1)).await
    });

    assert_eq!(slow.unwrap(), ShippingUpdate::Stale);
    assert_eq!(fast.unwrap(), ShippingUpdate::Applied);

    let snapshot = checkout.snapshot();
    assert_eq!(snapshot.selected_address, Some(AddressId::new(1)));
    assert_eq!(snapshot.summary.shipping, Some(Money::from_cents(8000)));
    assert_eq!(snapshot.phase, Phase::ShippingReady);
}

// =============================================================================
// Adding an address during checkout
// =============================================================================

#[tokio::test]
async fn test_add_address_from_postal_lookup() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;
    fill_cart(&storefront).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();

    let mut draft = AddressDraft {
        zip: "85501-560".to_string(),
        number: "45".to_string(),
        ..AddressDraft::default()
    };
    assert!(draft.zip_ready());
    match storefront.postal_lookup().lookup(&draft.zip).await {
        kiln_storefront::addresses::PostalLookup::Found(found) => draft.apply_lookup(&found),
        kiln_storefront::addresses::PostalLookup::NotFound => panic!("lookup should succeed"),
    }

    checkout.add_address(&draft).await.unwrap();

    let snapshot = checkout.snapshot();
    assert_eq!(snapshot.addresses.len(), 4);
    assert!(
        snapshot
            .addresses
            .iter()
            .any(|a| a.city == "Pato Branco" && a.country == "Brasil")
    );
    // The previous selection survives the reload.
    assert_eq!(snapshot.selected_address, Some(AddressId::new(1)));
}

#[tokio::test]
async fn test_invalid_address_is_rejected_locally() {
    let backend = MockBackend::start().await;
    let storefront = signed_in(&backend).await;

    let checkout = storefront.checkout();
    checkout.load_addresses().await.unwrap();
    backend.reset_calls();

    let err = checkout
        .add_address(&AddressDraft {
            zip: "8550".to_string(),
            ..AddressDraft::default()
        })
        .await
        .unwrap_err();

    let CheckoutError::Address(address_err) = err else {
        panic!("expected an address error");
    };
    let fields = address_err.field_errors().unwrap();
    assert_eq!(fields.get("zip"), Some("ZIP code must be exactly 8 digits"));
    assert_eq!(fields.get("street"), Some("Street is required"));
    assert_eq!(backend.count("POST", "/addresses"), 0);
}
