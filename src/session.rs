// src/session.rs

use crate::client::TokenResponse;
use crate::error::OidcRpError;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;
use tracing::warn;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const TOKEN_TYPE_COOKIE: &str = "token_type";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const EXPIRY_COOKIE: &str = "expiry";
pub const ID_TOKEN_COOKIE: &str = "id_token";

/// Every cookie that makes up a session. All of them must be present.
pub const SESSION_COOKIES: [&str; 5] = [
    ACCESS_TOKEN_COOKIE,
    TOKEN_TYPE_COOKIE,
    REFRESH_TOKEN_COOKIE,
    EXPIRY_COOKIE,
    ID_TOKEN_COOKIE,
];

/// Carries the `state` and `nonce` of a login flow between redirect and callback.
pub const FLOW_COOKIE: &str = "oidc_flow";
const FLOW_TTL: Duration = Duration::from_secs(10 * 60);

/// The tokens of one logged-in session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBundle {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    pub expiry: Option<DateTime<Utc>>,
    pub id_token: String,
}

impl TokenBundle {
    /// Builds the bundle from a token response whose `id_token` has already been verified.
    pub(crate) fn from_verified(response: TokenResponse, id_token: String) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            expiry: response.expiry,
            id_token,
        }
    }
}

/// Writes and reads sessions as a set of cookies.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    ttl: Duration,
    secure: bool,
}

impl SessionCodec {
    pub fn new(ttl: Duration, secure: bool) -> Self {
        Self { ttl, secure }
    }

    /// Adds the five session cookies to `jar`.
    ///
    /// Cookie lifetime is the codec's TTL, not the token expiry.
    pub fn encode(&self, bundle: &TokenBundle, jar: CookieJar) -> CookieJar {
        let expiry = bundle.expiry.map(format_expiry).unwrap_or_default();
        let values = [
            (ACCESS_TOKEN_COOKIE, bundle.access_token.clone()),
            (TOKEN_TYPE_COOKIE, bundle.token_type.clone()),
            (REFRESH_TOKEN_COOKIE, bundle.refresh_token.clone()),
            (EXPIRY_COOKIE, expiry),
            (ID_TOKEN_COOKIE, bundle.id_token.clone()),
        ];
        values.into_iter().fold(jar, |jar, (name, value)| {
            jar.add(self.cookie(name, value, self.ttl))
        })
    }

    /// Reads a session back out of `jar`.
    ///
    /// A missing cookie means no session, whichever one it is. An `expiry`
    /// that does not parse is reported instead of being read as "no expiry".
    pub fn decode(&self, jar: &CookieJar) -> Result<TokenBundle, OidcRpError> {
        let access_token = session_value(jar, ACCESS_TOKEN_COOKIE)?;
        let token_type = session_value(jar, TOKEN_TYPE_COOKIE)?;
        let refresh_token = session_value(jar, REFRESH_TOKEN_COOKIE)?;
        let expiry = session_value(jar, EXPIRY_COOKIE)?;
        let id_token = session_value(jar, ID_TOKEN_COOKIE)?;

        let expiry = parse_expiry(&expiry).inspect_err(|e| {
            warn!(error = %e, "Session cookie carries an unreadable expiry");
        })?;

        Ok(TokenBundle {
            access_token,
            token_type,
            refresh_token,
            expiry,
            id_token,
        })
    }

    /// Ends the session: every session cookie is sent back already expired.
    ///
    /// Succeeds whether or not a session existed.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        SESSION_COOKIES
            .into_iter()
            .fold(jar, |jar, name| jar.add(self.removal(name)))
    }

    /// Remembers the `state` and `nonce` of a login flow.
    pub fn encode_flow(&self, flow: &FlowState, jar: CookieJar) -> CookieJar {
        jar.add(self.cookie(FLOW_COOKIE, flow.to_cookie_value(), FLOW_TTL))
    }

    pub fn decode_flow(&self, jar: &CookieJar) -> Result<FlowState, OidcRpError> {
        live_cookie(jar, FLOW_COOKIE)
            .and_then(|c| FlowState::from_cookie_value(c.value()))
            .ok_or(OidcRpError::InvalidState)
    }

    pub fn clear_flow(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.removal(FLOW_COOKIE))
    }

    fn cookie(&self, name: &'static str, value: String, ttl: Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(cookie_max_age(ttl))
            .build()
    }

    fn removal(&self, name: &'static str) -> Cookie<'static> {
        let mut cookie = self.cookie(name, String::new(), Duration::ZERO);
        cookie.make_removal();
        cookie
    }
}

/// Per-flow anti-forgery values, bound to the browser through `FLOW_COOKIE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowState {
    pub state: String,
    pub nonce: String,
}

impl FlowState {
    fn to_cookie_value(&self) -> String {
        format!("{}.{}", self.state, self.nonce)
    }

    fn from_cookie_value(value: &str) -> Option<Self> {
        let (state, nonce) = value.split_once('.')?;
        if state.is_empty() || nonce.is_empty() {
            return None;
        }
        Some(Self {
            state: state.to_string(),
            nonce: nonce.to_string(),
        })
    }
}

/// A cookie already scheduled for removal in this jar no longer counts.
fn live_cookie<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a Cookie<'static>> {
    jar.get(name)
        .filter(|c| c.max_age() != Some(time::Duration::ZERO))
}

fn session_value(jar: &CookieJar, name: &'static str) -> Result<String, OidcRpError> {
    live_cookie(jar, name)
        .map(|c| c.value().to_string())
        .ok_or(OidcRpError::SessionAbsent(name))
}

fn cookie_max_age(ttl: Duration) -> time::Duration {
    time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

fn format_expiry(expiry: DateTime<Utc>) -> String {
    expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// An empty value stands for "the provider reported no expiry".
fn parse_expiry(value: &str) -> Result<Option<DateTime<Utc>>, OidcRpError> {
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| OidcRpError::InvalidExpiry {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
