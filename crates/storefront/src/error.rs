//! Unified error handling with Sentry integration.
//!
//! Every component returns its own error enum. [`StorefrontError`] gathers them
//! so the presentation layer has one place that turns any failure into a
//! [`Notice`] and reports the unexpected ones to Sentry.

use thiserror::Error;

use crate::addresses::AddressError;
use crate::api::ApiError;
use crate::auth::AuthError;
use crate::cart::CartError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::notice::Notice;
use crate::shipping::ShippingError;
use crate::storage::StorageError;
use crate::validation::FieldErrors;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Storefront-level error type.
#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl StorefrontError {
    /// Per-field messages to show inline, when the error carries any.
    #[must_use]
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            Self::Api(e) => e.field_errors(),
            Self::Address(e) => e.field_errors(),
            Self::Checkout(CheckoutError::Address(e)) => e.field_errors(),
            Self::Auth(AuthError::Validation(errors)) => Some(errors.clone()),
            Self::Auth(AuthError::Api(e)) => e.field_errors(),
            _ => None,
        }
    }

    /// Whether this is a failure the customer cannot fix (network, backend
    /// 5xx, local I/O), as opposed to validation or a business rule.
    #[must_use]
    pub const fn is_unexpected(&self) -> bool {
        match self {
            Self::Config(_) | Self::Storage(_) => true,
            Self::Api(e)
            | Self::Address(AddressError::Api(e))
            | Self::Auth(AuthError::Api(e))
            | Self::Checkout(CheckoutError::Submission(e)) => api_unexpected(e),
            Self::Cart(CartError::Storage(_) | CartError::Encode(_))
            | Self::Auth(AuthError::Storage(_)) => true,
            _ => false,
        }
    }

    /// Message shown to the customer.
    ///
    /// Internal details never reach the notice.
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            Self::Cart(CartError::AlreadyInCart(_)) => Notice::warning("Product already in cart")
                .with_description("This product is already added to your cart."),
            Self::Cart(CartError::NotInCart(_)) => {
                Notice::warning("This product is no longer in your cart.")
            }
            Self::Address(AddressError::ReferencedByOrder(_)) => {
                Notice::error("This address cannot be deleted.")
                    .with_description("It is used by one of your orders.")
            }
            Self::Address(AddressError::Validation(_))
            | Self::Auth(AuthError::Validation(_)) => {
                Notice::error("Please correct the highlighted fields.")
            }
            Self::Address(AddressError::MissingId) => {
                Notice::error("This address has not been saved yet.")
            }
            Self::Auth(AuthError::InvalidCredentials) => {
                Notice::error("Invalid email or password.")
            }
            Self::Shipping(_) => Notice::warning(crate::shipping::UNAVAILABLE_MESSAGE),
            Self::Checkout(e) => e.notice(),
            Self::Api(e) | Self::Address(AddressError::Api(e)) | Self::Auth(AuthError::Api(e))
                if e.is_unauthorized() =>
            {
                Notice::warning("Please log in to continue.")
            }
            Self::Api(e) | Self::Address(AddressError::Api(e)) | Self::Auth(AuthError::Api(e))
                if e.is_not_found() =>
            {
                Notice::error("Not found.")
            }
            _ => Notice::error(GENERIC_FAILURE),
        }
    }

    /// Log the error, capture unexpected ones to Sentry, and return the
    /// customer-facing notice.
    pub fn report(&self) -> Notice {
        if self.is_unexpected() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::debug!(error = %self, "Storefront error");
        }
        self.notice()
    }
}

const fn api_unexpected(error: &ApiError) -> bool {
    match error {
        ApiError::Status { status, .. } => *status >= 500,
        ApiError::Http(_) | ApiError::Decode { .. } | ApiError::InvalidUrl(_) => true,
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Set the Sentry user context after login.
pub fn set_sentry_user(email: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added product to cart", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::ApiErrorBody;
    use crate::notice::NoticeLevel;
    use kiln_core::{AddressId, ProductId};

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            status: code,
            body: ApiErrorBody::default(),
        }
    }

    #[test]
    fn test_storefront_error_display() {
        let err = StorefrontError::from(CartError::AlreadyInCart(ProductId::new(3)));
        assert_eq!(err.to_string(), "Cart error: product 3 is already in the cart");
    }

    #[test]
    fn test_notices() {
        let err = StorefrontError::from(AddressError::ReferencedByOrder(AddressId::new(1)));
        assert_eq!(err.notice().title, "This address cannot be deleted.");
        assert!(!err.is_unexpected());

        let err = StorefrontError::from(CheckoutError::EmptyCart);
        assert_eq!(err.notice().title, "No items in cart.");

        let err = StorefrontError::from(status(401));
        assert_eq!(err.notice().level, NoticeLevel::Warning);
    }

    #[test]
    fn test_server_errors_are_unexpected_but_hidden() {
        let body = ApiErrorBody {
            message: Some("NullPointerException at OrderService".to_string()),
            ..ApiErrorBody::default()
        };
        let err = StorefrontError::from(ApiError::Status { status: 500, body });
        assert!(err.is_unexpected());
        assert_eq!(err.notice().title, GENERIC_FAILURE);
        assert!(!err.notice().description.unwrap_or_default().contains("Null"));
    }

    #[test]
    fn test_client_errors_are_expected() {
        assert!(!StorefrontError::from(status(404)).is_unexpected());
        assert!(!StorefrontError::from(AuthError::InvalidCredentials).is_unexpected());
        assert!(StorefrontError::from(CheckoutError::Submission(status(503))).is_unexpected());
    }

    #[test]
    fn test_field_errors_from_backend() {
        let mut body = ApiErrorBody::default();
        body.validation_errors
            .insert("email".to_string(), "already registered".to_string());
        let err = StorefrontError::from(AuthError::Api(ApiError::Status { status: 400, body }));
        assert_eq!(
            err.field_errors().unwrap().get("email"),
            Some("already registered")
        );
    }
}
