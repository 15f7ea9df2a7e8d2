//! Carrier rate quotes (Melhor Envio).
//!
//! One POST to `me/shipment/calculate` returns an entry per requested carrier
//! service. Entries the carrier could not price carry an `error` field instead
//! of a price; those are dropped. A successful call with nothing left is
//! reported as [`ShippingError::Unavailable`], the same as a failed call from
//! the customer's point of view.

use std::time::Duration;

use async_trait::async_trait;
use kiln_core::{Money, PostalCode};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::api::join_url;
use crate::config::ShippingConfig;

const CALCULATE_PATH: &str = "me/shipment/calculate";

/// Shown when no quote could be obtained.
pub const UNAVAILABLE_MESSAGE: &str = "Frete indisponível";

/// Errors returned by the carrier client.
#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("carrier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("carrier returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected carrier response: {0}")]
    Parse(String),

    /// The carrier answered but offered no usable service.
    #[error("no shipping option available for this destination")]
    Unavailable,

    /// The destination address has no valid postal code.
    #[error("destination postal code is invalid: {0}")]
    InvalidDestination(String),
}

/// One package in a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parcel {
    pub id: String,
    /// Centimetres.
    pub width: u32,
    pub height: u32,
    pub length: u32,
    /// Kilograms.
    #[serde(with = "rust_decimal::serde::float")]
    pub weight: Decimal,
    pub insurance_value: Money,
    pub quantity: u32,
}

impl Default for Parcel {
    /// The standard box used for a single ceramic piece.
    fn default() -> Self {
        Self {
            id: "x".to_string(),
            width: 11,
            height: 17,
            length: 11,
            weight: Decimal::new(3, 1),
            insurance_value: Money::from_cents(1010),
            quantity: 1,
        }
    }
}

impl Parcel {
    /// The same parcel with a different unit count (at least one).
    #[must_use]
    pub fn with_quantity(self, quantity: u32) -> Self {
        Self {
            quantity: quantity.max(1),
            ..self
        }
    }
}

/// A priced shipping service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingOption {
    /// Carrier service id.
    pub id: u32,
    /// Service name, e.g. `PAC` or `SEDEX`.
    pub name: String,
    /// Carrier name, e.g. `Correios`.
    pub carrier: String,
    pub price: Money,
    /// Estimated delivery time in days.
    pub delivery_days: Option<u32>,
}

impl ShippingOption {
    /// Selector label such as `PAC (Correios) - $23.45, 5 days`.
    #[must_use]
    pub fn label(&self) -> String {
        let mut label = if self.carrier.is_empty() {
            format!("{} - {}", self.name, self.price)
        } else {
            format!("{} ({}) - {}", self.name, self.carrier, self.price)
        };
        if let Some(days) = self.delivery_days {
            let unit = if days == 1 { "day" } else { "days" };
            label.push_str(&format!(", {days} {unit}"));
        }
        label
    }
}

/// One-line summary of the quotes, e.g. `PAC: $23.45 | SEDEX: $41.10`.
#[must_use]
pub fn quote_message(options: &[ShippingOption]) -> String {
    if options.is_empty() {
        return UNAVAILABLE_MESSAGE.to_string();
    }
    options
        .iter()
        .map(|option| format!("{}: {}", option.name, option.price))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Source of shipping quotes, implemented by [`ShippingClient`].
#[async_trait]
pub trait ShippingQuoter: Send + Sync {
    /// Quote delivery of `parcels` to `destination`.
    ///
    /// Returns at least one option on success.
    async fn quote(
        &self,
        destination: &PostalCode,
        parcels: &[Parcel],
    ) -> Result<Vec<ShippingOption>, ShippingError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct CalculateRequest<'a> {
    from: PostalRef<'a>,
    to: PostalRef<'a>,
    products: &'a [Parcel],
    options: CalculateOptions,
    services: &'a str,
}

#[derive(Debug, Serialize)]
struct PostalRef<'a> {
    postal_code: &'a str,
}

#[derive(Debug, Serialize)]
struct CalculateOptions {
    receipt: bool,
    own_hand: bool,
}

/// Entry in the carrier response. Every field is optional because error
/// entries carry little more than `id`, `name` and `error`.
#[derive(Debug, Deserialize)]
struct QuoteEntry {
    #[serde(default)]
    id: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    price: Option<serde_json::Value>,
    #[serde(default)]
    delivery_time: Option<u32>,
    #[serde(default)]
    company: Option<Company>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Company {
    #[serde(default)]
    name: String,
}

impl QuoteEntry {
    fn into_option(self) -> Option<ShippingOption> {
        if self.error.as_ref().is_some_and(|e| !e.is_null()) {
            debug!(service = ?self.name, "Dropping carrier entry with error");
            return None;
        }
        let price = parse_price(self.price.as_ref()?)?;
        Some(ShippingOption {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            carrier: self.company.map(|c| c.name).unwrap_or_default(),
            price,
            delivery_days: self.delivery_time,
        })
    }
}

/// Prices arrive as strings (`"23.45"`) or numbers.
fn parse_price(value: &serde_json::Value) -> Option<Money> {
    let amount = match value {
        serde_json::Value::String(s) => s.trim().parse::<Decimal>().ok()?,
        serde_json::Value::Number(n) => n.to_string().parse::<Decimal>().ok()?,
        _ => return None,
    };
    (amount >= Decimal::ZERO).then(|| Money::new(amount))
}

/// Keep the usable entries of a carrier response.
fn parse_quotes(body: &str) -> Result<Vec<ShippingOption>, ShippingError> {
    let entries: Vec<QuoteEntry> =
        serde_json::from_str(body).map_err(|e| ShippingError::Parse(e.to_string()))?;
    Ok(entries
        .into_iter()
        .filter_map(QuoteEntry::into_option)
        .collect())
}

// =============================================================================
// ShippingClient
// =============================================================================

/// Melhor Envio rate-quote client.
#[derive(Clone)]
pub struct ShippingClient {
    client: reqwest::Client,
    config: ShippingConfig,
}

impl ShippingClient {
    /// Create a client from the carrier configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: ShippingConfig, timeout: Duration) -> Result<Self, ShippingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kiln-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// The parcel configured for single-piece quotes.
    #[must_use]
    pub fn default_parcel(&self) -> Parcel {
        self.config.default_parcel.clone()
    }
}

#[async_trait]
impl ShippingQuoter for ShippingClient {
    #[instrument(skip(self, parcels), fields(destination = %destination, parcels = parcels.len()))]
    async fn quote(
        &self,
        destination: &PostalCode,
        parcels: &[Parcel],
    ) -> Result<Vec<ShippingOption>, ShippingError> {
        let url = join_url(&self.config.api_url, CALCULATE_PATH)
            .map_err(|e| ShippingError::Parse(e.to_string()))?;
        let body = CalculateRequest {
            from: PostalRef {
                postal_code: self.config.origin.digits(),
            },
            to: PostalRef {
                postal_code: destination.digits(),
            },
            products: parcels,
            options: CalculateOptions {
                receipt: false,
                own_hand: false,
            },
            services: &self.config.services,
        };

        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(&body);
        if let Some(token) = &self.config.api_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, "Carrier rejected quote request");
            return Err(ShippingError::Api {
                status: status.as_u16(),
                message: text.chars().take(300).collect(),
            });
        }

        let options = parse_quotes(&text)?;
        if options.is_empty() {
            warn!("Carrier returned no usable quote");
            return Err(ShippingError::Unavailable);
        }
        debug!(count = options.len(), "Received shipping quotes");
        Ok(options)
    }
}
