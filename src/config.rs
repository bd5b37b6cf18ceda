// src/config.rs

use crate::error::OidcRpError;
use jsonwebtoken::Algorithm;
use std::env;
use std::time::Duration;
use url::Url;

/// Scopes requested on every authorization redirect.
pub const DEFAULT_SCOPES: [&str; 5] = ["openid", "offline_access", "profile", "email", "groups"];

const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8080";

/// Contains the validation settings for an OIDC ID Token.
///
/// This struct is used to configure the specific checks that will be performed
/// on the token's claims, such as allowed algorithms and clock skew tolerance.
#[derive(Debug, Clone)]
pub struct ValidationDetails {
    /// The signing algorithms that are permitted for the ID Token.
    /// Tokens signed with any other algorithm will be rejected.
    pub algorithms: Vec<Algorithm>,
    /// The tolerance for clock skew when validating time-based claims like `exp` and `iat`.
    /// Defaults to 60 seconds.
    pub leeway: Duration,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            // Default to RS256, the most common algorithm for OIDC.
            algorithms: vec![Algorithm::RS256],
            leeway: Duration::from_secs(60),
        }
    }
}

/// The client configuration of the relying party.
///
/// Built once at startup and shared read-only between requests. It should be
/// constructed using the `ConfigBuilder` or `Config::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    /// The issuer URL of the OIDC provider. This is used for discovery and to
    /// validate the `iss` claim of the ID Token.
    pub issuer_url: Url,
    /// The client ID of the application, as registered with the OIDC provider.
    /// This is used to validate the `aud` claim of the ID Token.
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider sends the user back to after login.
    pub redirect_url: Url,
    /// Socket address the HTTP server binds to.
    pub listen_address: String,
    pub scopes: Vec<String>,
    /// The specific validation parameters to apply to the token.
    pub validation: ValidationDetails,
    /// How long a resolved provider descriptor is reused before discovery runs again.
    pub discovery_cache_ttl: Duration,
    /// Minimum age of the cached descriptor before an unknown `kid` may force rediscovery.
    pub discovery_refresh_interval: Duration,
    /// Upper bound on every request made to the provider.
    pub http_timeout: Duration,
    /// Lifetime of the session cookies, independent of the token expiry.
    pub session_ttl: Duration,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl Config {
    /// Loads the configuration from the process environment.
    ///
    /// Required: `OIDC_ISSUER`, `OIDC_CLIENT_ID`, `OIDC_CLIENT_SECRET`, `OIDC_REDIRECT_URL`.
    /// Optional: `LISTEN_ADDRESS`, `OIDC_DISCOVERY_CACHE_SECONDS`,
    /// `OIDC_DISCOVERY_REFRESH_SECONDS`, `OIDC_HTTP_TIMEOUT_SECONDS`, `COOKIE_SECURE`.
    pub fn from_env() -> Result<Self, OidcRpError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, OidcRpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| OidcRpError::MissingConfiguration(key.to_string()))
        };

        let mut builder = ConfigBuilder::new()
            .issuer_url(&require("OIDC_ISSUER")?)?
            .client_id(require("OIDC_CLIENT_ID")?)
            .client_secret(require("OIDC_CLIENT_SECRET")?)
            .redirect_url(&require("OIDC_REDIRECT_URL")?)?;

        if let Some(addr) = lookup("LISTEN_ADDRESS") {
            builder = builder.listen_address(addr);
        }
        if let Some(ttl) = seconds(&lookup, "OIDC_DISCOVERY_CACHE_SECONDS")? {
            builder = builder.discovery_cache_ttl(ttl);
        }
        if let Some(interval) = seconds(&lookup, "OIDC_DISCOVERY_REFRESH_SECONDS")? {
            builder = builder.discovery_refresh_interval(interval);
        }
        if let Some(timeout) = seconds(&lookup, "OIDC_HTTP_TIMEOUT_SECONDS")? {
            builder = builder.http_timeout(timeout);
        }
        if let Some(flag) = lookup("COOKIE_SECURE") {
            builder = builder.secure_cookies(matches!(flag.as_str(), "1" | "true" | "yes"));
        }

        builder.build()
    }
}

fn seconds<F>(lookup: &F, key: &str) -> Result<Option<Duration>, OidcRpError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|secs| {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| OidcRpError::MissingConfiguration(format!("{}: {}", key, e)))
        })
        .transpose()
}

/// A builder for creating a `Config` instance.
///
/// This builder provides a fluent API to ensure that the configuration is
/// constructed correctly and with all required fields.
#[derive(Default)]
pub struct ConfigBuilder {
    issuer_url: Option<Url>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_url: Option<Url>,
    listen_address: Option<String>,
    scopes: Option<Vec<String>>,
    discovery_cache_ttl: Option<Duration>,
    discovery_refresh_interval: Option<Duration>,
    http_timeout: Option<Duration>,
    session_ttl: Option<Duration>,
    secure_cookies: bool,
    validation: ValidationDetails,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the issuer URL of the OIDC provider. This is a required field.
    ///
    /// # Arguments
    ///
    /// * `url` - The issuer URL, e.g., "https://accounts.google.com".
    pub fn issuer_url(mut self, url: &str) -> Result<Self, OidcRpError> {
        let parsed_url = Url::parse(url).map_err(|e| OidcRpError::InvalidUrl(e.to_string()))?;
        self.issuer_url = Some(parsed_url);
        Ok(self)
    }

    /// Sets the client ID of the application. This is a required field.
    pub fn client_id(mut self, client_id: String) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Sets the client secret. This is a required field.
    pub fn client_secret(mut self, client_secret: String) -> Self {
        self.client_secret = Some(client_secret);
        self
    }

    /// Sets the callback URL registered with the provider. This is a required field.
    pub fn redirect_url(mut self, url: &str) -> Result<Self, OidcRpError> {
        let parsed_url = Url::parse(url).map_err(|e| OidcRpError::InvalidUrl(e.to_string()))?;
        self.redirect_url = Some(parsed_url);
        Ok(self)
    }

    pub fn listen_address(mut self, addr: String) -> Self {
        self.listen_address = Some(addr);
        self
    }

    /// Overrides the requested scopes.
    /// Defaults to `openid offline_access profile email groups`.
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Sets how long discovery metadata is cached. Defaults to 5 minutes.
    pub fn discovery_cache_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_cache_ttl = Some(ttl);
        self
    }

    /// Sets how old the cached descriptor must be before a token signed with an
    /// unknown key may trigger rediscovery. Defaults to 30 seconds.
    pub fn discovery_refresh_interval(mut self, interval: Duration) -> Self {
        self.discovery_refresh_interval = Some(interval);
        self
    }

    /// Sets the timeout for requests to the provider. Defaults to 10 seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets the session cookie lifetime. Defaults to 5 minutes.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Sets the allowed signing algorithms.
    /// Defaults to `[Algorithm::RS256]` if not set.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    /// Sets the clock skew tolerance. This is optional.
    /// Defaults to 60 seconds.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields (`issuer_url`, `client_id`,
    /// `client_secret`, `redirect_url`) are missing.
    pub fn build(self) -> Result<Config, OidcRpError> {
        let issuer_url = self
            .issuer_url
            .ok_or(OidcRpError::MissingConfiguration("issuer_url".to_string()))?;
        let client_id = self
            .client_id
            .ok_or(OidcRpError::MissingConfiguration("client_id".to_string()))?;
        let client_secret = self
            .client_secret
            .ok_or(OidcRpError::MissingConfiguration("client_secret".to_string()))?;
        let redirect_url = self
            .redirect_url
            .ok_or(OidcRpError::MissingConfiguration("redirect_url".to_string()))?;

        Ok(Config {
            issuer_url,
            client_id,
            client_secret,
            redirect_url,
            listen_address: self
                .listen_address
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string()),
            scopes: self
                .scopes
                .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()),
            validation: self.validation,
            discovery_cache_ttl: self.discovery_cache_ttl.unwrap_or(Duration::from_secs(5 * 60)),
            discovery_refresh_interval: self
                .discovery_refresh_interval
                .unwrap_or(Duration::from_secs(30)),
            http_timeout: self.http_timeout.unwrap_or(Duration::from_secs(10)),
            session_ttl: self.session_ttl.unwrap_or(Duration::from_secs(5 * 60)),
            secure_cookies: self.secure_cookies,
        })
    }
}
