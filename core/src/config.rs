use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::credentials::{AuthScheme, Credentials};

pub const DEFAULT_USER_AGENT: &str = "WebDAV-UnitTestProject/1.0.0";
pub const DEFAULT_TIMEOUT_MS: u64 = 100_000;
pub const DEFAULT_TARGET_URL: &str = "http://localhost:8880/";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub credentials: Credentials,
    pub client: ClientConfig,
    pub target: TargetConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub auth_scheme: AuthScheme,
}

impl ClientConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auth_scheme: AuthScheme::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("credentials.username", "")?
        .set_default("credentials.password", "")?
        .set_default("credentials.domain", "")?
        .set_default("client.user_agent", DEFAULT_USER_AGENT)?
        .set_default("client.timeout_ms", DEFAULT_TIMEOUT_MS)?
        .set_default("client.auth_scheme", "Negotiate")?
        .set_default("target.url", DEFAULT_TARGET_URL)?
        .set_default("logging.level", "info")
}

impl Settings {
    /// ## Summary
    /// Loads settings from `webdav.toml` (optional) and `WEBDAV_*` environment
    /// variables on top of the built-in defaults. Environment variables take
    /// precedence over the file, e.g. `WEBDAV_CREDENTIALS__USERNAME`.
    ///
    /// ## Errors
    /// Returns an error if a source cannot be read or deserialization fails.
    pub fn load() -> Result<Self, ConfigError> {
        with_defaults()?
            .add_source(File::with_name("webdav.toml").required(false))
            .add_source(
                Environment::with_prefix("WEBDAV")
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true),
            )
            .build()?
            .try_deserialize::<Settings>()
    }

    /// ## Summary
    /// Builds settings from a TOML document layered over the defaults.
    ///
    /// ## Errors
    /// Returns an error if the document is malformed or a value has the wrong type.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize::<Settings>()
    }
}

/// ## Summary
/// Loads settings after reading a `.env` file into the environment, if present.
///
/// ## Errors
/// Returns an error if loading or deserializing the settings fails.
pub fn load_settings() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    Settings::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.client.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(settings.client.timeout(), Duration::from_secs(100));
        assert_eq!(settings.client.auth_scheme, AuthScheme::Negotiate);
        assert_eq!(settings.target.url, DEFAULT_TARGET_URL);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.credentials, Credentials::default());
    }

    #[test]
    fn document_overrides_defaults() {
        let settings = Settings::from_toml(
            r#"
            [credentials]
            username = "alice"
            password = "secret"
            domain = "CORP"

            [client]
            auth_scheme = "basic"
            timeout_ms = 2500

            [target]
            url = "http://dav.example.com/files/"
            "#,
        )
        .unwrap();
        assert_eq!(settings.credentials, Credentials::new("alice", "secret", "CORP"));
        assert_eq!(settings.client.auth_scheme, AuthScheme::Basic);
        assert_eq!(settings.client.timeout(), Duration::from_millis(2500));
        assert_eq!(settings.client.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(settings.target.url, "http://dav.example.com/files/");
    }

    #[test]
    fn unknown_auth_scheme_is_rejected() {
        let result = Settings::from_toml("[client]\nauth_scheme = \"digest\"\n");
        assert!(result.is_err());
    }
}
