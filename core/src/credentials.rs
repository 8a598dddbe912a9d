//! Credential lookup for outgoing requests.
//!
//! # Design
//! A `CredentialProvider` maps a target URI to an identity. The shipped
//! `StaticCredentials` returns the one configured identity for every URI.
//! Each request receives its own `CredentialCache` scoped to its target, and
//! the executor decides from the server's challenge whether to present it.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

/// A username/password/domain triple.
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str, domain: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            domain: domain.to_string(),
        }
    }

    /// `DOMAIN\user` when a domain is configured, otherwise just `user`.
    pub fn user_principal(&self) -> String {
        if self.domain.is_empty() {
            self.username.clone()
        } else {
            format!("{}\\{}", self.domain, self.username)
        }
    }

    /// Value for an `Authorization: Basic ...` header.
    pub fn basic_authorization(&self) -> String {
        let raw = format!("{}:{}", self.user_principal(), self.password);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Authentication scheme a credential cache entry is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum AuthScheme {
    #[serde(alias = "basic")]
    Basic,
    /// Kerberos or NTLM chosen by SPNEGO. This client cannot produce
    /// SPNEGO tokens, so a cache registered for it answers no challenge.
    #[default]
    #[serde(alias = "negotiate")]
    Negotiate,
}

impl AuthScheme {
    /// Whether credentials registered for `self` may answer a challenge for
    /// `challenge`.
    pub fn answers(&self, challenge: &str) -> bool {
        match self {
            AuthScheme::Basic => challenge.eq_ignore_ascii_case("basic"),
            // Never downgraded to Basic: that would put the password on the wire.
            AuthScheme::Negotiate => false,
        }
    }
}

/// Credentials scoped to a URI prefix and an authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCache {
    pub uri_prefix: String,
    pub scheme: AuthScheme,
    pub credentials: Credentials,
}

impl CredentialCache {
    pub fn new(uri_prefix: &str, scheme: AuthScheme, credentials: Credentials) -> Self {
        Self {
            uri_prefix: uri_prefix.to_string(),
            scheme,
            credentials,
        }
    }

    /// Credentials to present for `uri` in response to a `challenge` scheme.
    pub fn lookup(&self, uri: &str, challenge: &str) -> Option<&Credentials> {
        (uri.starts_with(&self.uri_prefix) && self.scheme.answers(challenge)).then_some(&self.credentials)
    }
}

/// Supplies the identity to use for a target URI.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self, target: &str) -> Credentials;

    /// Wrap the identity for `target` in a cache keyed by that URI.
    fn credential_cache(&self, target: &str, scheme: AuthScheme) -> CredentialCache {
        CredentialCache::new(target, scheme, self.credentials(target))
    }
}

/// Returns the same configured identity for every URI.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Credentials);

impl CredentialProvider for StaticCredentials {
    fn credentials(&self, _target: &str) -> Credentials {
        self.0.clone()
    }
}
