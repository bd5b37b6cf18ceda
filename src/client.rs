// src/client.rs

use crate::config::Config;
use crate::discovery::ProviderDescriptor;
use crate::error::OidcRpError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, instrument};
use url::Url;

/// The client side of the authorization code exchange.
///
/// Pairs the client credentials with the endpoints of the current provider.
/// Built fresh from a `Config` and a `ProviderDescriptor`; it has no failure mode.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: Url,
    pub auth_url: Url,
    pub token_url: Url,
    pub scopes: Vec<String>,
}

impl ExchangeConfig {
    pub fn new(config: &Config, provider: &ProviderDescriptor) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            auth_url: provider.authorization_endpoint.clone(),
            token_url: provider.token_endpoint.clone(),
            scopes: config.scopes.clone(),
        }
    }

    /// Builds the authorization redirect for one login flow.
    pub fn authorization_url(&self, state: &str, nonce: &str) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_url.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        url
    }

    /// Exchanges an authorization code at the token endpoint.
    ///
    /// The client authenticates with HTTP Basic (`client_secret_basic`). Any
    /// transport failure or non-2xx answer is an `Exchange` error; the provider
    /// rejects expired, reused or mismatched codes this way.
    #[instrument(skip(self, http_client, code), fields(token_url = %self.token_url), err)]
    pub async fn exchange_code(
        &self,
        http_client: &reqwest::Client,
        code: &str,
    ) -> Result<TokenResponse, OidcRpError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
        ];

        let response = http_client
            .post(self.token_url.clone())
            .basic_auth(
                form_encode(&self.client_id),
                Some(form_encode(&self.client_secret)),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| OidcRpError::Exchange(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OidcRpError::Exchange(format!(
                "token endpoint answered {}: {}",
                status, body
            )));
        }

        let received_at = Utc::now();
        let raw: RawTokenResponse = response
            .json()
            .await
            .map_err(|e| OidcRpError::Exchange(format!("malformed token response: {}", e)))?;
        if raw.access_token.is_empty() {
            return Err(OidcRpError::Exchange(
                "server response missing access_token".to_string(),
            ));
        }
        debug!(token_type = %raw.token_type, "Authorization code exchanged");

        Ok(TokenResponse::from_raw(raw, received_at))
    }
}

/// RFC 6749 §2.3.1: credentials are form-urlencoded before going into the Basic header.
fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

/// A successful answer from the token endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    /// Absolute expiry of the access token, when the provider reported `expires_in`.
    pub expiry: Option<DateTime<Utc>>,
    /// Fields beyond the OAuth2 core set, e.g. `id_token`.
    pub extra: HashMap<String, Value>,
}

impl TokenResponse {
    fn from_raw(raw: RawTokenResponse, received_at: DateTime<Utc>) -> Self {
        let expiry = raw
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| received_at + chrono::Duration::seconds(secs));
        Self {
            access_token: raw.access_token,
            token_type: raw.token_type,
            refresh_token: raw.refresh_token.unwrap_or_default(),
            expiry,
            extra: raw.extra,
        }
    }

    /// The raw ID Token carried in the `id_token` extension field.
    pub fn id_token(&self) -> Result<&str, OidcRpError> {
        self.extra
            .get("id_token")
            .and_then(Value::as_str)
            .ok_or(OidcRpError::MissingIdentityToken)
    }
}
