//! Signup, login and the persisted session.
//!
//! The session token is stored under the `token` storage key so a restarted
//! storefront stays signed in. [`AuthClient::restore`] re-attaches it to the
//! shared [`ApiClient`]; every resource client then sends it as bearer auth.

use std::sync::Arc;

use kiln_core::{Email, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, ApiError};
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::pages::Route;
use crate::storage::{KeyValueStorage, StorageError, keys};
use crate::validation::FieldErrors;

const USERS_PATH: &str = "/users";
const LOGIN_PATH: &str = "/login";

/// Errors returned by authentication and user operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password rejected by the backend.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Form failed client or server validation.
    #[error("invalid form: {0}")]
    Validation(FieldErrors),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub ssn: String,
    /// ISO date (`yyyy-mm-dd`).
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub phone: String,
}

/// Registration form.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct SignupForm {
    pub display_name: String,
    pub email: String,
    pub password: SecretString,
    pub ssn: String,
    pub birth_date: String,
    pub gender: String,
    pub phone: String,
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupBody<'a> {
    display_name: &'a str,
    email: &'a str,
    password: &'a str,
    ssn: &'a str,
    birth_date: &'a str,
    gender: &'a str,
    phone: &'a str,
}

impl SignupForm {
    /// Client-side checks run before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns the failing fields.
    pub fn validate(&self) -> Result<Email, FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.display_name.trim().is_empty() {
            errors.add("displayName", "Name is required");
        }
        let email = Email::parse(&self.email)
            .map_err(|e| errors.add("email", e.to_string()))
            .ok();
        if self.password.expose_secret().is_empty() {
            errors.add("password", "Password is required");
        }
        match email {
            Some(email) => errors.into_result(email),
            None => Err(errors),
        }
    }
}

/// Login form.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Session management against the backend.
#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
    storage: Arc<dyn KeyValueStorage>,
}

impl AuthClient {
    #[must_use]
    pub fn new(api: ApiClient, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { api, storage }
    }

    /// Register a new customer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for client or server validation
    /// failures, or the underlying API error.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn signup(&self, form: &SignupForm) -> Result<(), AuthError> {
        let email = form.validate().map_err(AuthError::Validation)?;
        let body = SignupBody {
            display_name: form.display_name.trim(),
            email: email.as_str(),
            password: form.password.expose_secret(),
            ssn: &form.ssn,
            birth_date: &form.birth_date,
            gender: &form.gender,
            phone: &form.phone,
        };

        match self.api.post_discarding(USERS_PATH, &body).await {
            Ok(()) => {
                info!("Customer registered");
                Ok(())
            }
            Err(e) => Err(e
                .field_errors()
                .map_or_else(|| AuthError::Api(e), AuthError::Validation)),
        }
    }

    /// Sign in, persist the token and attach it to later requests.
    ///
    /// Returns the route to open next: the remembered destination if one was
    /// stored before the login redirect, otherwise home.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] on 401/403.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<Route, AuthError> {
        let email = credentials.email.trim().to_lowercase();
        let body = LoginBody {
            email: &email,
            password: credentials.password.expose_secret(),
        };

        let response: LoginResponse = match self.api.post(LOGIN_PATH, &body).await {
            Ok(response) => response,
            Err(e) if e.is_unauthorized() => {
                warn!("Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        self.storage.set(keys::TOKEN, &response.token)?;
        self.api.set_token(Some(SecretString::from(response.token)));
        set_sentry_user(&email);
        add_breadcrumb("auth", "Logged in", None);
        info!("Customer logged in");

        Ok(self.take_post_login_route())
    }

    /// Re-attach a stored token. Returns whether one was found.
    pub fn restore(&self) -> bool {
        match self.storage.get(keys::TOKEN) {
            Ok(Some(token)) if !token.trim().is_empty() => {
                self.api.set_token(Some(SecretString::from(token)));
                debug!("Restored session token");
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                false
            }
        }
    }

    /// Forget the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored token cannot be removed.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<(), AuthError> {
        self.api.set_token(None);
        self.storage.remove(keys::TOKEN)?;
        clear_sentry_user();
        add_breadcrumb("auth", "Logged out", None);
        Ok(())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.api.has_token()
    }

    /// Remember where to go once the customer has logged in.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written.
    pub fn remember_destination(&self, route: &Route) -> Result<(), AuthError> {
        self.storage.set(keys::LAST_PAGE, &route.path())?;
        Ok(())
    }

    /// Consume the remembered destination, defaulting to home.
    pub fn take_post_login_route(&self) -> Route {
        let stored = self.storage.get(keys::LAST_PAGE).ok().flatten();
        if stored.is_some() {
            if let Err(e) = self.storage.remove(keys::LAST_PAGE) {
                warn!(error = %e, "Failed to clear remembered destination");
            }
        }
        stored
            .as_deref()
            .and_then(Route::from_path)
            .unwrap_or(Route::Home)
    }
}

/// REST client for `/users`.
#[derive(Clone)]
pub struct UserClient {
    api: ApiClient,
}

impl UserClient {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<User>, ApiError> {
        self.api.get(USERS_PATH).await
    }

    /// # Errors
    ///
    /// Returns an error if the user does not exist or the request fails.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn find_by_id(&self, id: UserId) -> Result<User, ApiError> {
        self.api.get(&format!("{USERS_PATH}/{id}")).await
    }

    /// Save profile changes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] when the backend rejects fields.
    #[instrument(skip(self, user), fields(user_id = ?user.id))]
    pub async fn update(&self, user: &User) -> Result<(), AuthError> {
        let Some(id) = user.id else {
            let mut errors = FieldErrors::new();
            errors.add("id", "User has not been saved");
            return Err(AuthError::Validation(errors));
        };
        self.api
            .put_discarding(&format!("{USERS_PATH}/{id}"), user)
            .await
            .map_err(|e| {
                e.field_errors()
                    .map_or_else(|| AuthError::Api(e), AuthError::Validation)
            })
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete(&self, id: UserId) -> Result<(), ApiError> {
        self.api.delete(&format!("{USERS_PATH}/{id}")).await
    }
}
