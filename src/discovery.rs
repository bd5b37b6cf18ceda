// src/discovery.rs

use crate::error::OidcRpError;
use crate::model::{JsonWebKeySet, OidcDiscoveryDocument};
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// A signing key published by the provider.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: Option<String>,
    pub key: DecodingKey,
}

/// Everything the relying party needs to know about the provider for one login.
#[derive(Clone)]
pub struct ProviderDescriptor {
    /// The issuer exactly as the provider advertises it. Tokens must carry this `iss`.
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_uri: Url,
    pub keys: Vec<SigningKey>,
    /// When this descriptor was fetched from the provider.
    pub fetched_at: Instant,
}

impl ProviderDescriptor {
    /// Looks up the key for `kid`. Without a `kid` every published key is a candidate.
    pub fn keys_for(&self, kid: Option<&str>) -> Vec<&DecodingKey> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .filter(|k| k.kid.as_deref() == Some(kid))
                .map(|k| &k.key)
                .collect(),
            None => self.keys.iter().map(|k| &k.key).collect(),
        }
    }
}

/// Resolves the configured issuer into a `ProviderDescriptor`.
///
/// The descriptor is cached for a bounded interval so that logins and callbacks
/// share one discovery round trip; concurrent misses wait on a single fetch.
/// `refresh` goes back to the provider, but never more often than the
/// configured refresh interval.
#[derive(Clone)]
pub struct ProviderDiscovery {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    issuer_url: Url,
    refresh_interval: Duration,
    // Cache stores issuer -> descriptor.
    cache: Cache<String, Arc<ProviderDescriptor>>,
}

impl ProviderDiscovery {
    pub fn new(
        issuer_url: Url,
        cache_ttl: Duration,
        refresh_interval: Duration,
        http_client: reqwest::Client,
    ) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(cache_ttl).build();
        Self {
            inner: Arc::new(Inner {
                http_client,
                issuer_url,
                refresh_interval,
                cache,
            }),
        }
    }

    /// Returns the cached descriptor, fetching it from the provider on a miss.
    #[instrument(skip(self), err)]
    pub async fn current(&self) -> Result<Arc<ProviderDescriptor>, OidcRpError> {
        let key = self.inner.issuer_url.to_string();
        self.inner
            .cache
            .try_get_with(key, async { self.fetch().await.map(Arc::new) })
            .await
            .map_err(unshare)
    }

    /// Drops the cached descriptor and resolves it again, unless it was fetched
    /// less than the refresh interval ago.
    #[instrument(skip(self), err)]
    pub async fn refresh(&self) -> Result<Arc<ProviderDescriptor>, OidcRpError> {
        let key = self.inner.issuer_url.to_string();
        if let Some(descriptor) = self.inner.cache.get(&key).await {
            let age = descriptor.fetched_at.elapsed();
            if age < self.inner.refresh_interval {
                debug!(?age, "Provider descriptor is fresh, skipping rediscovery");
                return Ok(descriptor);
            }
            self.inner.cache.invalidate(&key).await;
        }
        self.current().await
    }

    async fn fetch(&self) -> Result<ProviderDescriptor, OidcRpError> {
        let discovery_url = discovery_url(&self.inner.issuer_url)?;
        debug!("Provider descriptor cache miss. Performing OIDC discovery at: {}", discovery_url);

        let document: OidcDiscoveryDocument = self.get_json(discovery_url).await?;
        if !issuer_matches(&self.inner.issuer_url, &document.issuer) {
            return Err(OidcRpError::Discovery(format!(
                "issuer did not match the issuer returned by provider, expected {:?} got {:?}",
                self.inner.issuer_url.as_str(),
                document.issuer
            )));
        }

        let jwks_uri = parse_endpoint("jwks_uri", &document.jwks_uri)?;
        let jwks: JsonWebKeySet = self.get_json(jwks_uri.clone()).await?;
        let keys = signing_keys(jwks)?;
        debug!("Discovered {} signing keys at {}", keys.len(), jwks_uri);

        Ok(ProviderDescriptor {
            authorization_endpoint: parse_endpoint(
                "authorization_endpoint",
                &document.authorization_endpoint,
            )?,
            token_endpoint: parse_endpoint("token_endpoint", &document.token_endpoint)?,
            issuer: document.issuer,
            jwks_uri,
            keys,
            fetched_at: Instant::now(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, OidcRpError> {
        let response = self
            .inner
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| OidcRpError::Discovery(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OidcRpError::Discovery(format!("GET {}: {} {}", url, status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| OidcRpError::Discovery(format!("malformed response from {}: {}", url, e)))
    }
}

/// Callers waiting on the same failed fetch share its error.
fn unshare(e: Arc<OidcRpError>) -> OidcRpError {
    Arc::try_unwrap(e).unwrap_or_else(|shared| OidcRpError::Discovery(shared.to_string()))
}

fn discovery_url(issuer: &Url) -> Result<Url, OidcRpError> {
    let base = issuer.as_str().trim_end_matches('/');
    Url::parse(&format!("{}{}", base, WELL_KNOWN_PATH))
        .map_err(|e| OidcRpError::InvalidUrl(e.to_string()))
}

/// `Url` always renders an empty path as `/`, so a root issuer advertised
/// without the slash still counts as the configured one.
fn issuer_matches(configured: &Url, advertised: &str) -> bool {
    configured.as_str() == advertised
        || (configured.path() == "/" && configured.as_str().strip_suffix('/') == Some(advertised))
}

fn parse_endpoint(name: &str, value: &str) -> Result<Url, OidcRpError> {
    Url::parse(value).map_err(|e| OidcRpError::Discovery(format!("invalid {}: {}", name, e)))
}

fn signing_keys(jwks: JsonWebKeySet) -> Result<Vec<SigningKey>, OidcRpError> {
    let mut keys = Vec::with_capacity(jwks.keys.len());
    for jwk in jwks.keys {
        if jwk.use_purpose.as_deref().is_some_and(|u| u != "sig") {
            continue;
        }
        // We only support RSA keys for now, as they are the most common for OIDC.
        if jwk.kty != "RSA" {
            debug!("Skipping JWK with unsupported kty: {}", jwk.kty);
            continue;
        }
        let n = jwk
            .n
            .as_deref()
            .ok_or_else(|| OidcRpError::Discovery("RSA key missing 'n' component".to_string()))?;
        let e = jwk
            .e
            .as_deref()
            .ok_or_else(|| OidcRpError::Discovery("RSA key missing 'e' component".to_string()))?;
        let key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| OidcRpError::Discovery(format!("invalid RSA key: {}", e)))?;
        keys.push(SigningKey { kid: jwk.kid, key });
    }
    Ok(keys)
}
