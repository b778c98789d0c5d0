//! Caller authentication.
//!
//! Credentials are checked in a fixed priority order and the first one
//! present decides the outcome:
//!
//! 1. `x-api-key` header against the configured static keys
//! 2. `Authorization: Bearer <jwt>`
//! 3. the session cookie, holding a token signed the same way as (2)
//!
//! A present-but-invalid credential fails immediately; lower-priority schemes
//! are not consulted.

use std::collections::{HashMap, HashSet};

use axum::http::{HeaderMap, header};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, Role};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Wildcard permission granting access to every service.
pub const ALL_PERMISSIONS: &str = "*";

/// A verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthPrincipal {
    pub subject: String,
    pub role: Role,
    pub permissions: HashSet<String>,
}

impl AuthPrincipal {
    /// First permission in `required` this principal lacks, if any.
    pub fn missing_permission<'a>(&self, required: &'a [String]) -> Option<&'a str> {
        if self.role == Role::Admin || self.permissions.contains(ALL_PERMISSIONS) {
            return None;
        }
        required
            .iter()
            .find(|p| !self.permissions.contains(p.as_str()))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no credentials provided")]
    MissingCredentials,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token authentication is not configured")]
    TokensDisabled,
}

impl AuthError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::InvalidApiKey => "invalid_api_key",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokensDisabled => "tokens_disabled",
        }
    }
}

/// Result of [`Authenticator::authenticate`].
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub authenticated: bool,
    pub principal: Option<AuthPrincipal>,
    pub error: Option<AuthError>,
}

impl From<Result<AuthPrincipal, AuthError>> for AuthOutcome {
    fn from(result: Result<AuthPrincipal, AuthError>) -> Self {
        match result {
            Ok(principal) => Self {
                authenticated: true,
                principal: Some(principal),
                error: None,
            },
            Err(error) => Self {
                authenticated: false,
                principal: None,
                error: Some(error),
            },
        }
    }
}

/// Claims carried by bearer and session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
}

pub struct Authenticator {
    api_keys: HashMap<String, AuthPrincipal>,
    decoding_key: Option<DecodingKey>,
    validation: Validation,
    session_cookie: String,
    public_paths: Vec<String>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("api_keys", &self.api_keys.len())
            .field("tokens_enabled", &self.decoding_key.is_some())
            .field("session_cookie", &self.session_cookie)
            .field("public_paths", &self.public_paths)
            .finish()
    }
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let api_keys = config
            .api_keys
            .iter()
            .map(|k| {
                (
                    k.key.clone(),
                    AuthPrincipal {
                        subject: k.subject.clone(),
                        role: k.role,
                        permissions: k.permissions.iter().cloned().collect(),
                    },
                )
            })
            .collect();

        let decoding_key = (!config.jwt_secret.is_empty())
            .then(|| DecodingKey::from_secret(config.jwt_secret.as_bytes()));

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_audience(&[&config.jwt_audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = config.leeway_secs;

        Self {
            api_keys,
            decoding_key,
            validation,
            session_cookie: config.session_cookie.clone(),
            public_paths: config.public_paths.clone(),
        }
    }

    /// Whether `path` (the backend path) skips authentication.
    pub fn is_public(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        self.public_paths
            .iter()
            .any(|p| p.trim_end_matches('/') == path)
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        self.verify(headers).into()
    }

    fn verify(&self, headers: &HeaderMap) -> Result<AuthPrincipal, AuthError> {
        if let Some(key) = header_str(headers, API_KEY_HEADER) {
            return self
                .api_keys
                .get(key)
                .cloned()
                .ok_or(AuthError::InvalidApiKey);
        }

        if let Some(token) = header_str(headers, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            return self.verify_token(token.trim());
        }

        if let Some(token) = cookie_value(headers, &self.session_cookie) {
            return self.verify_token(token);
        }

        Err(AuthError::MissingCredentials)
    }

    fn verify_token(&self, token: &str) -> Result<AuthPrincipal, AuthError> {
        let key = self.decoding_key.as_ref().ok_or(AuthError::TokensDisabled)?;

        let data = decode::<Claims>(token, key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        tracing::debug!(subject = %data.claims.sub, "Token verified");
        Ok(AuthPrincipal {
            subject: data.claims.sub,
            role: data.claims.role,
            permissions: data.claims.permissions.into_iter().collect(),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}
