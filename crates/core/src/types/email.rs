//! Customer email addresses.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// Nothing was entered.
    #[error("email is required")]
    Empty,
    /// Longer than the SMTP path limit.
    #[error("email must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// Contains whitespace inside the address.
    #[error("email cannot contain spaces")]
    Whitespace,
    /// Not of the form `local@domain.tld`.
    #[error("email must look like name@domain.com")]
    Malformed,
}

/// An email address as typed into the signup and login forms.
///
/// Surrounding whitespace is trimmed and the address is lower-cased, so the
/// same account is found however the customer capitalised it. The check is
/// deliberately shallow (one `@`, a dotted domain); the backend owns the
/// authoritative validation and reports failures per field.
///
/// ```
/// use kiln_core::Email;
///
/// let email = Email::parse("  Ana@Ceramica.com.br ").unwrap();
/// assert_eq!(email.as_str(), "ana@ceramica.com.br");
/// assert!(Email::parse("ana@localhost").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse and normalise an email address.
    ///
    /// # Errors
    ///
    /// Returns an [`EmailError`] describing the first problem found.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EmailError::Empty);
        }
        if trimmed.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(EmailError::Whitespace);
        }

        let (local, domain) = trimmed.split_once('@').ok_or(EmailError::Malformed)?;
        let domain_ok = !domain.contains('@')
            && domain
                .split('.')
                .filter(|label| !label.is_empty())
                .count()
                >= 2
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || !domain_ok {
            return Err(EmailError::Malformed);
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the domain part (after the `@`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
