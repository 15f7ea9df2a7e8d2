//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `KILN_API_URL` - Base URL of the shop backend REST API
//!
//! ## Optional
//! - `KILN_DATA_DIR` - Directory for locally persisted state (default: .kiln)
//! - `KILN_HTTP_TIMEOUT_SECS` - Request timeout for all HTTP calls (default: 15)
//! - `POSTAL_LOOKUP_URL` - ViaCEP base URL (default: <https://viacep.com.br/ws>)
//! - `CARRIER_API_URL` - Melhor Envio base URL (default: <https://www.melhorenvio.com.br/api/v2>)
//! - `CARRIER_API_TOKEN` - Melhor Envio bearer token
//! - `SHIPPING_ORIGIN_POSTAL_CODE` - Seller postal code (default: 85501560)
//! - `SHIPPING_SERVICES` - Carrier service ids to quote (default: 1,2,18)
//! - `KILN_LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use kiln_core::PostalCode;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::shipping::Parcel;

const DEFAULT_POSTAL_LOOKUP_URL: &str = "https://viacep.com.br/ws";
const DEFAULT_CARRIER_API_URL: &str = "https://www.melhorenvio.com.br/api/v2";
const DEFAULT_ORIGIN_POSTAL_CODE: &str = "85501560";
const DEFAULT_SHIPPING_SERVICES: &str = "1,2,18";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Storefront configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Shop backend base URL
    pub api_url: Url,
    /// Directory holding the persisted cart and session token
    pub data_dir: PathBuf,
    /// Timeout applied to every HTTP request
    pub http_timeout: Duration,
    /// Postal code lookup service base URL
    pub postal_lookup_url: Url,
    /// Carrier rate-quote configuration
    pub shipping: ShippingConfig,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Carrier (Melhor Envio) configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct ShippingConfig {
    /// Carrier API base URL
    pub api_url: Url,
    /// Bearer token for the carrier API
    pub api_token: Option<SecretString>,
    /// Seller-side origin postal code
    pub origin: PostalCode,
    /// Comma-separated carrier service ids
    pub services: String,
    /// Parcel used for quotes when the cart does not describe one
    pub default_parcel: Parcel,
}

impl std::fmt::Debug for ShippingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingConfig")
            .field("api_url", &self.api_url.as_str())
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("origin", &self.origin.digits())
            .field("services", &self.services)
            .field("default_parcel", &self.default_parcel)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the carrier token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`StorefrontConfig::from_env`].
    pub fn from_source<F>(source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(source);

        let api_url = env.url("KILN_API_URL", None)?;
        let data_dir = PathBuf::from(env.or_default("KILN_DATA_DIR", ".kiln"));
        let http_timeout = env
            .or_default("KILN_HTTP_TIMEOUT_SECS", "15")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("KILN_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
        let postal_lookup_url = env.url("POSTAL_LOOKUP_URL", Some(DEFAULT_POSTAL_LOOKUP_URL))?;
        let shipping = ShippingConfig::from_env(&env)?;
        let log_format = env
            .or_default("KILN_LOG_FORMAT", "text")
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::InvalidEnvVar("KILN_LOG_FORMAT".to_string(), e))?;

        Ok(Self {
            api_url,
            data_dir,
            http_timeout,
            postal_lookup_url,
            shipping,
            log_format,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }
}

impl ShippingConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        let origin_raw = env.or_default("SHIPPING_ORIGIN_POSTAL_CODE", DEFAULT_ORIGIN_POSTAL_CODE);
        let origin = PostalCode::parse(&origin_raw).map_err(|e| {
            ConfigError::InvalidEnvVar("SHIPPING_ORIGIN_POSTAL_CODE".to_string(), e.to_string())
        })?;

        let services = env.or_default("SHIPPING_SERVICES", DEFAULT_SHIPPING_SERVICES);
        validate_services(&services)?;

        let api_token = match env.optional("CARRIER_API_TOKEN") {
            Some(token) => {
                validate_secret_strength(&token, "CARRIER_API_TOKEN")?;
                Some(SecretString::from(token))
            }
            None => None,
        };

        Ok(Self {
            api_url: env.url("CARRIER_API_URL", Some(DEFAULT_CARRIER_API_URL))?,
            api_token,
            origin,
            services,
            default_parcel: Parcel::default(),
        })
    }

    /// Whether a carrier token is configured.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.api_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Key lookup wrapper so the loaders can run against a map in tests.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Get an optional variable, treating empty values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a URL, required when no default is given.
    fn url(&self, key: &str, default: Option<&str>) -> Result<Url, ConfigError> {
        let raw = match (self.optional(key), default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => return Err(ConfigError::MissingEnvVar(key.to_string())),
        };
        Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

/// Service ids must be a comma-separated list of integers.
fn validate_services(services: &str) -> Result<(), ConfigError> {
    let valid = services
        .split(',')
        .all(|id| !id.trim().is_empty() && id.trim().chars().all(|c| c.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvVar(
            "SHIPPING_SERVICES".to_string(),
            format!("expected comma-separated service ids, got '{services}'"),
        ))
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
