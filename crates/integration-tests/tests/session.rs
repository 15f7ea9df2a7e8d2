//! Login, signup and the customer profile against the mock backend.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use kiln_core::{AddressId, ProductId, UserId};
use kiln_integration_tests::{CUSTOMER_EMAIL, CUSTOMER_PASSWORD, CUSTOMER_TOKEN, MockBackend};
use kiln_storefront::StorefrontError;
use kiln_storefront::auth::{AuthError, Credentials, SignupForm};
use kiln_storefront::pages::Route;
use kiln_storefront::storage::{KeyValueStorage, MemoryStorage, keys};
use secrecy::SecretString;

fn credentials(email: &str, password: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: SecretString::from(password),
    }
}

fn signup_form(email: &str) -> SignupForm {
    SignupForm {
        display_name: "Bruno Lima".to_string(),
        email: email.to_string(),
        password: SecretString::from("argila-forte"),
        ssn: "98765432100".to_string(),
        birth_date: "1988-11-20".to_string(),
        gender: "Male".to_string(),
        phone: "41988887777".to_string(),
    }
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_persists_token() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    assert!(!storefront.auth().is_authenticated());

    let route = storefront
        .auth()
        .login(&credentials(CUSTOMER_EMAIL, CUSTOMER_PASSWORD))
        .await
        .unwrap();

    assert_eq!(route, Route::Home);
    assert!(storefront.auth().is_authenticated());
    assert_eq!(
        storefront.storage().get(keys::TOKEN).unwrap().as_deref(),
        Some(CUSTOMER_TOKEN)
    );
}

#[tokio::test]
async fn test_login_normalizes_email() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    storefront
        .auth()
        .login(&credentials("  Ana@Loja.com ", CUSTOMER_PASSWORD))
        .await
        .unwrap();
    assert!(storefront.auth().is_authenticated());
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    let err = storefront
        .auth()
        .login(&credentials(CUSTOMER_EMAIL, "errada"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(!storefront.auth().is_authenticated());
    assert_eq!(storefront.storage().get(keys::TOKEN).unwrap(), None);
    assert_eq!(
        StorefrontError::from(err).notice().title,
        "Invalid email or password."
    );
}

#[tokio::test]
async fn test_guest_checkout_resumes_after_login() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront.product_list().add_to_cart(ProductId::new(1)).await;

    let next = storefront.cart_page().checkout(storefront.auth()).unwrap();
    assert_eq!(next, Route::Login);

    let after_login = storefront
        .auth()
        .login(&credentials(CUSTOMER_EMAIL, CUSTOMER_PASSWORD))
        .await
        .unwrap();
    assert_eq!(after_login, Route::Checkout);
    assert_eq!(storefront.storage().get(keys::LAST_PAGE).unwrap(), None);

    let again = storefront.cart_page().checkout(storefront.auth()).unwrap();
    assert_eq!(again, Route::Checkout);
}

#[tokio::test]
async fn test_stored_session_is_restored() {
    let backend = MockBackend::start().await;
    let storage = Arc::new(MemoryStorage::with_entry(keys::TOKEN, CUSTOMER_TOKEN));
    let storefront = backend.storefront_with(storage);

    assert!(storefront.auth().is_authenticated());
    assert_eq!(storefront.addresses().find_by_id(AddressId::new(1)).await.unwrap().zip, "80010000");
}

#[tokio::test]
async fn test_logout_drops_session() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront
        .auth()
        .login(&credentials(CUSTOMER_EMAIL, CUSTOMER_PASSWORD))
        .await
        .unwrap();

    storefront.auth().logout().unwrap();

    assert!(!storefront.auth().is_authenticated());
    assert_eq!(storefront.storage().get(keys::TOKEN).unwrap(), None);
    let err = storefront.account_page().orders().await.unwrap_err();
    assert!(err.is_unauthorized());
}

// =============================================================================
// Signup
// =============================================================================

#[tokio::test]
async fn test_signup_creates_user() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    storefront
        .auth()
        .signup(&signup_form("bruno@loja.com"))
        .await
        .unwrap();

    let users = storefront.users().list().await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().any(|u| u.email == "bruno@loja.com"));
    assert_eq!(backend.count("POST", "/users"), 1);
}

#[tokio::test]
async fn test_signup_duplicate_email_maps_to_field() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    let err = storefront
        .auth()
        .signup(&signup_form(CUSTOMER_EMAIL))
        .await
        .unwrap_err();

    let AuthError::Validation(fields) = err else {
        panic!("expected field errors");
    };
    assert_eq!(fields.get("email"), Some("already registered"));
}

#[tokio::test]
async fn test_signup_checks_form_locally() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();

    let form = SignupForm {
        display_name: "  ".to_string(),
        email: "not-an-email".to_string(),
        ..signup_form("unused@loja.com")
    };
    let err = storefront.auth().signup(&form).await.unwrap_err();

    let AuthError::Validation(fields) = err else {
        panic!("expected field errors");
    };
    assert_eq!(fields.get("displayName"), Some("Name is required"));
    assert!(fields.get("email").is_some());
    assert!(backend.calls().is_empty());
}

// =============================================================================
// Profile
// =============================================================================

#[tokio::test]
async fn test_profile_update() {
    let backend = MockBackend::start().await;
    let storefront = backend.storefront();
    storefront
        .auth()
        .login(&credentials(CUSTOMER_EMAIL, CUSTOMER_PASSWORD))
        .await
        .unwrap();

    let users = storefront.users();
    let mut user = users.find_by_id(UserId::new(1)).await.unwrap();
    assert_eq!(user.display_name, "Ana Souza");

    user.phone = "46911112222".to_string();
    users.update(&user).await.unwrap();

    let saved = users.find_by_id(UserId::new(1)).await.unwrap();
    assert_eq!(saved.phone, "46911112222");
    assert_eq!(saved.birth_date, "1990-05-01");
}
