//! Brazilian postal codes (CEP).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PostalCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PostalCodeError {
    /// The input has the wrong number of digits.
    #[error("ZIP code must be exactly {expected} digits (got {actual})")]
    WrongLength {
        /// Required digit count.
        expected: usize,
        /// Digits found in the input.
        actual: usize,
    },
}

/// An eight-digit postal code.
///
/// Formatting characters (`-`, `.`, spaces) are stripped on parse, so
/// `"85501-560"` and `"85501560"` are the same code. The digits-only form is
/// what both the postal lookup service and the carrier API expect.
///
/// ```
/// use kiln_core::PostalCode;
///
/// let cep = PostalCode::parse("85501-560").unwrap();
/// assert_eq!(cep.digits(), "85501560");
/// assert_eq!(cep.to_string(), "85501-560");
/// assert!(PostalCode::parse("1234").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    /// Number of digits in a postal code.
    pub const DIGITS: usize = 8;

    /// Parse a postal code, ignoring any non-digit characters.
    ///
    /// # Errors
    ///
    /// Returns [`PostalCodeError::WrongLength`] unless exactly eight digits
    /// remain after stripping.
    pub fn parse(input: &str) -> Result<Self, PostalCodeError> {
        let digits = Self::strip(input);
        if digits.len() != Self::DIGITS {
            return Err(PostalCodeError::WrongLength {
                expected: Self::DIGITS,
                actual: digits.len(),
            });
        }
        Ok(Self(digits))
    }

    /// Whether partially typed input has reached the full digit count.
    #[must_use]
    pub fn is_complete(input: &str) -> bool {
        Self::strip(input).len() == Self::DIGITS
    }

    /// The code as eight digits with no separator.
    #[must_use]
    pub fn digits(&self) -> &str {
        &self.0
    }

    fn strip(input: &str) -> String {
        input.chars().filter(char::is_ascii_digit).collect()
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.0.split_at(5);
        write!(f, "{head}-{tail}")
    }
}

impl TryFrom<String> for PostalCode {
    type Error = PostalCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostalCode> for String {
    fn from(code: PostalCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for PostalCode {
    type Err = PostalCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
