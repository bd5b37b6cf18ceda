// src/flow.rs

use crate::claims::IdentityClaims;
use crate::client::ExchangeConfig;
use crate::config::Config;
use crate::directory::{UserDirectory, UserRecord};
use crate::discovery::{ProviderDescriptor, ProviderDiscovery};
use crate::error::OidcRpError;
use crate::session::{FlowState, SessionCodec, TokenBundle};
use crate::verifier::{IdTokenVerifier, VerifiedIdToken};
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

/// Where to send the browser, and what to remember until it comes back.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub url: Url,
    pub flow: FlowState,
}

/// The result of a completed login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub claims: IdentityClaims,
    pub tokens: TokenBundle,
}

/// The relying party: everything a login needs, shared by all requests.
pub struct RelyingParty {
    config: Arc<Config>,
    discovery: ProviderDiscovery,
    verifier: IdTokenVerifier,
    directory: Arc<dyn UserDirectory>,
    sessions: SessionCodec,
    http_client: reqwest::Client,
}

impl RelyingParty {
    pub fn new(config: Config, directory: Arc<dyn UserDirectory>) -> Result<Self, OidcRpError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| OidcRpError::HttpClient(e.to_string()))?;
        let discovery = ProviderDiscovery::new(
            config.issuer_url.clone(),
            config.discovery_cache_ttl,
            config.discovery_refresh_interval,
            http_client.clone(),
        );
        let verifier = IdTokenVerifier::new(config.client_id.clone(), config.validation.clone());
        let sessions = SessionCodec::new(config.session_ttl, config.secure_cookies);
        Ok(Self {
            config: Arc::new(config),
            discovery,
            verifier,
            directory,
            sessions,
            http_client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionCodec {
        &self.sessions
    }

    /// Starts a login: resolves the provider and builds its authorization URL
    /// with a fresh `state` and `nonce`.
    #[instrument(skip(self), err)]
    pub async fn begin_login(&self) -> Result<LoginRedirect, OidcRpError> {
        let provider = self.discovery.current().await?;
        let exchange = ExchangeConfig::new(&self.config, &provider);

        let flow = FlowState {
            state: random_token(),
            nonce: random_token(),
        };
        let url = exchange.authorization_url(&flow.state, &flow.nonce);
        Ok(LoginRedirect { url, flow })
    }

    /// Finishes a login from the provider's callback.
    ///
    /// `state` must match the flow remembered for this browser. Nothing from the
    /// token response is trusted until its ID Token has been verified.
    #[instrument(skip(self, code, state, flow), err)]
    pub async fn complete_login(
        &self,
        code: &str,
        state: &str,
        flow: &FlowState,
    ) -> Result<LoginOutcome, OidcRpError> {
        if state.is_empty() || state != flow.state {
            warn!("Callback state does not match the login flow");
            return Err(OidcRpError::InvalidState);
        }

        let provider = self.discovery.current().await?;
        let exchange = ExchangeConfig::new(&self.config, &provider);
        let response = exchange.exchange_code(&self.http_client, code).await?;
        let raw_id_token = response.id_token()?.to_string();

        let verified = self
            .verify_with_rotation(provider, &raw_id_token, Some(&flow.nonce))
            .await?;
        let mut claims = verified.claims()?;
        claims.access_token = response.access_token.clone();
        claims.id_token = raw_id_token.clone();

        self.directory.upsert(UserRecord {
            subject: claims.subject.clone(),
            name: claims.name.clone(),
            audience: claims.audience.clone(),
            email: claims.email.clone(),
        });
        info!(subject = %claims.subject, "User logged in");

        Ok(LoginOutcome {
            claims,
            tokens: TokenBundle::from_verified(response, raw_id_token),
        })
    }

    /// Resolves the user behind a session by re-verifying its stored ID Token.
    #[instrument(skip(self, tokens), err)]
    pub async fn session_user(&self, tokens: &TokenBundle) -> Result<UserRecord, OidcRpError> {
        let provider = self.discovery.current().await?;
        let verified = self
            .verify_with_rotation(provider, &tokens.id_token, None)
            .await?;
        let claims = verified.claims()?;
        self.directory
            .find(&claims.subject)
            .ok_or(OidcRpError::UnknownUser(claims.subject))
    }

    /// Verifies against the cached keys; an unknown `kid` triggers one rediscovery,
    /// rate limited by the discovery refresh interval.
    async fn verify_with_rotation(
        &self,
        provider: Arc<ProviderDescriptor>,
        raw_id_token: &str,
        nonce: Option<&str>,
    ) -> Result<VerifiedIdToken, OidcRpError> {
        match self.verifier.verify(&provider, raw_id_token, nonce) {
            Err(OidcRpError::KeyNotFound(kid)) => {
                info!(%kid, "Signing key not cached, refreshing provider keys");
                let provider = self.discovery.refresh().await?;
                self.verifier
                    .verify(&provider, raw_id_token, nonce)
                    .map_err(|e| match e {
                        OidcRpError::KeyNotFound(kid) => OidcRpError::Verification(format!(
                            "no signing key published for kid {}",
                            kid
                        )),
                        e => e,
                    })
            }
            result => result,
        }
    }
}

fn random_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}
