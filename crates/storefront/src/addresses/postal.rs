//! Postal code lookup (ViaCEP).
//!
//! Autofill is best effort: a short code, an unknown code and an unreachable
//! service all come back as [`PostalLookup::NotFound`] and the customer types
//! the address by hand.

use std::time::Duration;

use kiln_core::PostalCode;
use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::api::join_url;

const CACHE_TTL: Duration = Duration::from_secs(3600);
const CACHE_CAPACITY: u64 = 500;

/// Address fields known for a postal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalAddress {
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

/// Result of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostalLookup {
    Found(PostalAddress),
    NotFound,
}

/// ViaCEP response body.
#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    erro: Option<serde_json::Value>,
    #[serde(default)]
    logradouro: String,
    #[serde(default)]
    bairro: String,
    #[serde(default)]
    localidade: String,
    #[serde(default)]
    uf: String,
}

impl ViaCepResponse {
    fn into_lookup(self) -> PostalLookup {
        // ViaCEP has sent both `true` and `"true"` for unknown codes.
        let missing = match &self.erro {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(_) => true,
        };
        if missing {
            return PostalLookup::NotFound;
        }
        PostalLookup::Found(PostalAddress {
            street: self.logradouro,
            neighborhood: self.bairro,
            city: self.localidade,
            state: self.uf,
        })
    }
}

/// Client for the postal lookup service.
#[derive(Clone)]
pub struct PostalLookupClient {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<PostalCode, PostalAddress>,
}

impl PostalLookupClient {
    /// Create a client against `base_url` (e.g. `https://viacep.com.br/ws`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Ok(Self {
            client,
            base_url,
            cache,
        })
    }

    /// Look up a partially typed postal code.
    ///
    /// No request is made until the input holds exactly eight digits.
    #[instrument(skip(self))]
    pub async fn lookup(&self, input: &str) -> PostalLookup {
        let Ok(code) = PostalCode::parse(input) else {
            return PostalLookup::NotFound;
        };

        if let Some(found) = self.cache.get(&code).await {
            debug!("Cache hit for postal code");
            return PostalLookup::Found(found);
        }

        match self.fetch(&code).await {
            Ok(PostalLookup::Found(found)) => {
                self.cache.insert(code, found.clone()).await;
                PostalLookup::Found(found)
            }
            Ok(PostalLookup::NotFound) => {
                debug!("Postal code not found");
                PostalLookup::NotFound
            }
            Err(e) => {
                warn!(error = %e, "Postal lookup failed");
                PostalLookup::NotFound
            }
        }
    }

    async fn fetch(&self, code: &PostalCode) -> Result<PostalLookup, LookupFailure> {
        let url = join_url(&self.base_url, &format!("{}/json/", code.digits()))?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(PostalLookup::NotFound);
        }
        let body: ViaCepResponse = response.json().await?;
        Ok(body.into_lookup())
    }
}

#[derive(Debug, thiserror::Error)]
enum LookupFailure {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
