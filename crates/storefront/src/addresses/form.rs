//! Address form model and client-side validation.

use kiln_core::{AddressId, PostalCode};

use super::{Address, PostalAddress};
use crate::validation::FieldErrors;

/// Country filled in when a postal lookup succeeds.
const LOOKUP_COUNTRY: &str = "Brasil";

/// Address form as typed by the customer.
///
/// Every field is raw text; [`AddressDraft::validate`] turns it into an
/// [`Address`] or a set of per-field messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDraft {
    pub id: Option<AddressId>,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip: String,
}

impl AddressDraft {
    /// Pre-fill the form for editing a saved address.
    #[must_use]
    pub fn from_address(address: &Address) -> Self {
        Self {
            id: address.id,
            street: address.street.clone(),
            number: address.number.to_string(),
            complement: address.complement.clone(),
            neighborhood: address.neighborhood.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            country: address.country.clone(),
            zip: address.zip.clone(),
        }
    }

    /// Whether the postal code field is complete enough to look up.
    #[must_use]
    pub fn zip_ready(&self) -> bool {
        PostalCode::is_complete(&self.zip)
    }

    /// Overwrite the fields a postal lookup knows about.
    pub fn apply_lookup(&mut self, found: &PostalAddress) {
        self.street.clone_from(&found.street);
        self.neighborhood.clone_from(&found.neighborhood);
        self.city.clone_from(&found.city);
        self.state.clone_from(&found.state);
        self.country = LOOKUP_COUNTRY.to_string();
    }

    /// Check the form and build the address to send.
    ///
    /// The postal code is stored as its eight digits.
    ///
    /// # Errors
    ///
    /// Returns every failing field with its message.
    pub fn validate(&self) -> Result<Address, FieldErrors> {
        let mut errors = FieldErrors::new();

        let zip = PostalCode::parse(&self.zip);
        if zip.is_err() {
            errors.add("zip", "ZIP code must be exactly 8 digits");
        }

        let number = self.number.trim().parse::<i32>().ok().filter(|n| *n > 0);
        if number.is_none() {
            errors.add("number", "Number must be a valid numeric value");
        }

        for (field, value, message) in [
            ("street", &self.street, "Street is required"),
            ("city", &self.city, "City is required"),
            ("state", &self.state, "State is required"),
            ("country", &self.country, "Country is required"),
        ] {
            if value.trim().is_empty() {
                errors.add(field, message);
            }
        }

        match (zip, number) {
            (Ok(zip), Some(number)) if errors.is_empty() => Ok(Address {
                id: self.id,
                street: self.street.trim().to_string(),
                number,
                complement: self.complement.trim().to_string(),
                neighborhood: self.neighborhood.trim().to_string(),
                city: self.city.trim().to_string(),
                state: self.state.trim().to_string(),
                country: self.country.trim().to_string(),
                zip: zip.digits().to_string(),
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn filled() -> AddressDraft {
        AddressDraft {
            street: "Rua Tocantins".to_string(),
            number: "45".to_string(),
            city: "Pato Branco".to_string(),
            state: "PR".to_string(),
            country: "Brasil".to_string(),
            zip: "85501-560".to_string(),
            ..AddressDraft::default()
        }
    }

    #[test]
    fn test_valid_draft() {
        let address = filled().validate().unwrap();
        assert_eq!(address.number, 45);
        assert_eq!(address.zip, "85501560");
        assert!(address.id.is_none());
    }

    #[test]
    fn test_empty_draft_reports_every_field() {
        let errors = AddressDraft::default().validate().unwrap_err();
        assert_eq!(errors.get("zip"), Some("ZIP code must be exactly 8 digits"));
        assert_eq!(errors.get("number"), Some("Number must be a valid numeric value"));
        assert_eq!(errors.get("street"), Some("Street is required"));
        assert_eq!(errors.get("city"), Some("City is required"));
        assert_eq!(errors.get("state"), Some("State is required"));
        assert_eq!(errors.get("country"), Some("Country is required"));
        assert!(errors.get("complement").is_none());
    }

    #[test]
    fn test_non_numeric_number() {
        let draft = AddressDraft {
            number: "12A".to_string(),
            ..filled()
        };
        let errors = draft.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.get("number").is_some());
    }

    #[test]
    fn test_number_must_be_positive() {
        for number in ["0", "-5"] {
            let draft = AddressDraft {
                number: number.to_string(),
                ..filled()
            };
            let errors = draft.validate().unwrap_err();
            assert_eq!(errors.get("number"), Some("Number must be a valid numeric value"));
        }
    }

    #[test]
    fn test_apply_lookup_sets_country() {
        let mut draft = AddressDraft {
            zip: "01310100".to_string(),
            ..AddressDraft::default()
        };
        draft.apply_lookup(&PostalAddress {
            street: "Avenida Paulista".to_string(),
            neighborhood: "Bela Vista".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
        });
        assert_eq!(draft.country, "Brasil");
        assert_eq!(draft.city, "São Paulo");
        assert!(draft.zip_ready());
    }

    #[test]
    fn test_from_address_roundtrips() {
        let address = filled().validate().unwrap();
        let draft = AddressDraft::from_address(&address);
        assert_eq!(draft.validate().unwrap(), address);
    }
}
