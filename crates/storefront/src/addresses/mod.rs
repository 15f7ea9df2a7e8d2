//! Customer address book.
//!
//! [`AddressClient`] maps the backend's `/addresses` resource 1:1 onto REST
//! verbs. The checkout flow and account page depend on the [`AddressApi`]
//! trait rather than the concrete client so they can be driven by fakes.
//!
//! Deleting an address that an order still references is refused by the
//! backend with `409 Conflict`; that case is surfaced as
//! [`AddressError::ReferencedByOrder`] and the address stays in the book.

mod form;
mod postal;

pub use form::AddressDraft;
pub use postal::{PostalAddress, PostalLookup, PostalLookupClient};

use async_trait::async_trait;
use kiln_core::{AddressId, PostalCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::api::{ApiClient, ApiError};
use crate::validation::FieldErrors;

const ADDRESSES_PATH: &str = "/addresses";

/// A delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AddressId>,
    pub street: String,
    pub number: i32,
    #[serde(default)]
    pub complement: String,
    #[serde(default)]
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip: String,
}

impl Address {
    /// The postal code, if the stored value is a valid one.
    #[must_use]
    pub fn postal_code(&self) -> Option<PostalCode> {
        PostalCode::parse(&self.zip).ok()
    }

    /// One-line rendering used by address selectors.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!("{}, {}", self.street, self.number);
        if !self.complement.trim().is_empty() {
            line.push_str(" - ");
            line.push_str(self.complement.trim());
        }
        if !self.neighborhood.trim().is_empty() {
            line.push_str(", ");
            line.push_str(self.neighborhood.trim());
        }
        let zip = self
            .postal_code()
            .map_or_else(|| self.zip.clone(), |code| code.to_string());
        line.push_str(&format!(", {}/{} - {zip}", self.city, self.state));
        line
    }
}

/// Errors returned by address operations.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The backend refused the request or could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The address is used by at least one order and cannot be deleted.
    #[error("address {0} is referenced by an order")]
    ReferencedByOrder(AddressId),

    /// Client or server side validation failed.
    #[error("invalid address: {0}")]
    Validation(FieldErrors),

    /// An update was requested for an address that was never saved.
    #[error("address has no id")]
    MissingId,
}

impl AddressError {
    /// Field errors to show inline on the form, if any.
    #[must_use]
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors.clone()),
            Self::Api(e) => e.field_errors(),
            _ => None,
        }
    }
}

/// Address book operations used by the checkout flow and account page.
#[async_trait]
pub trait AddressApi: Send + Sync {
    /// All addresses of the signed-in customer.
    async fn list(&self) -> Result<Vec<Address>, AddressError>;

    /// Save a new address.
    async fn create(&self, address: &Address) -> Result<(), AddressError>;

    /// Replace an existing address.
    async fn update(&self, address: &Address) -> Result<(), AddressError>;

    /// Delete an address.
    async fn delete(&self, id: AddressId) -> Result<(), AddressError>;
}

/// REST client for `/addresses`.
#[derive(Clone)]
pub struct AddressClient {
    api: ApiClient,
}

impl AddressClient {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch one address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not exist or the request fails.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn find_by_id(&self, id: AddressId) -> Result<Address, AddressError> {
        Ok(self.api.get(&format!("{ADDRESSES_PATH}/{id}")).await?)
    }
}

#[async_trait]
impl AddressApi for AddressClient {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Address>, AddressError> {
        Ok(self.api.get(ADDRESSES_PATH).await?)
    }

    #[instrument(skip(self, address), fields(zip = %address.zip))]
    async fn create(&self, address: &Address) -> Result<(), AddressError> {
        self.api
            .post_discarding(ADDRESSES_PATH, address)
            .await
            .map_err(validation_or_api)
    }

    #[instrument(skip(self, address), fields(address_id = ?address.id))]
    async fn update(&self, address: &Address) -> Result<(), AddressError> {
        let id = address.id.ok_or(AddressError::MissingId)?;
        self.api
            .put_discarding(&format!("{ADDRESSES_PATH}/{id}"), address)
            .await
            .map_err(validation_or_api)
    }

    #[instrument(skip(self), fields(address_id = %id))]
    async fn delete(&self, id: AddressId) -> Result<(), AddressError> {
        match self.api.delete(&format!("{ADDRESSES_PATH}/{id}")).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                warn!("Address is referenced by an order, delete refused");
                Err(AddressError::ReferencedByOrder(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a `validationErrors` response onto form fields.
fn validation_or_api(error: ApiError) -> AddressError {
    match error.field_errors() {
        Some(fields) => AddressError::Validation(fields),
        None => AddressError::Api(error),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::ApiErrorBody;

    fn address() -> Address {
        Address {
            id: Some(AddressId::new(4)),
            street: "Rua das Flores".to_string(),
            number: 120,
            complement: "Apto 3".to_string(),
            neighborhood: "Centro".to_string(),
            city: "Pato Branco".to_string(),
            state: "PR".to_string(),
            country: "Brasil".to_string(),
            zip: "85501560".to_string(),
        }
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(
            address().summary_line(),
            "Rua das Flores, 120 - Apto 3, Centro, Pato Branco/PR - 85501-560"
        );

        let bare = Address {
            complement: String::new(),
            neighborhood: String::new(),
            ..address()
        };
        assert_eq!(bare.summary_line(), "Rua das Flores, 120, Pato Branco/PR - 85501-560");
    }

    #[test]
    fn test_serialize_omits_missing_id() {
        let new = Address {
            id: None,
            ..address()
        };
        let json = serde_json::to_value(&new).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["number"], 120);
    }

    #[test]
    fn test_validation_errors_map_to_fields() {
        let mut body = ApiErrorBody::default();
        body.validation_errors
            .insert("zip".to_string(), "must not be blank".to_string());
        let err = validation_or_api(ApiError::Status { status: 400, body });
        assert_eq!(
            err.field_errors().unwrap().get("zip"),
            Some("must not be blank")
        );
        assert!(matches!(err, AddressError::Validation(_)));
    }

    #[test]
    fn test_plain_failure_stays_api_error() {
        let err = validation_or_api(ApiError::Status {
            status: 500,
            body: ApiErrorBody::default(),
        });
        assert!(matches!(err, AddressError::Api(_)));
        assert!(err.field_errors().is_none());
    }
}
