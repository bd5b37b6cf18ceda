// src/error.rs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// The primary error type for the `oidc-rp` crate.
///
/// Every step of the login flow maps to one variant so that handlers can decide
/// between a server fault and a rejected login without inspecting messages.
#[derive(Debug, Error)]
pub enum OidcRpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// The issuer could not be reached or returned unusable metadata.
    #[error("init provider failed: {0}")]
    Discovery(String),

    /// The token endpoint rejected the authorization code.
    #[error("exchange token with server failed: {0}")]
    Exchange(String),

    #[error("token response does not carry an id_token string")]
    MissingIdentityToken,

    /// Signature, issuer, audience or expiry checks failed.
    #[error("verify IDToken with oidc provider failed: {0}")]
    Verification(String),

    /// Verification failure: no published key carries the token's `kid`.
    /// Internal to a single verification attempt; once rediscovery has been
    /// tried, callers see `Verification`.
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),

    /// Verification failure: the token is signed with an algorithm outside the allow-list.
    #[error("Unsupported JWT algorithm: {0:?}")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),

    /// Verification failure: the token's `nonce` is not the one sent with the login.
    #[error("Nonce mismatch: the nonce in the token does not match the login flow")]
    NonceMismatch,

    #[error("parse id token failed: {0}")]
    ClaimsDecode(String),

    /// One of the session cookies is missing. Treated as "not logged in".
    #[error("session cookie '{0}' is absent")]
    SessionAbsent(&'static str),

    #[error("session expiry '{value}' is not an RFC 3339 timestamp: {reason}")]
    InvalidExpiry { value: String, reason: String },

    /// The callback's `state` does not match the flow cookie.
    #[error("login state is missing or does not match")]
    InvalidState,

    #[error("user '{0}' is not known")]
    UnknownUser(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OidcRpError {
    /// The HTTP status a handler answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OidcRpError::Exchange(_)
            | OidcRpError::MissingIdentityToken
            | OidcRpError::Verification(_)
            | OidcRpError::KeyNotFound(_)
            | OidcRpError::UnsupportedAlgorithm(_)
            | OidcRpError::NonceMismatch
            | OidcRpError::SessionAbsent(_)
            | OidcRpError::InvalidExpiry { .. }
            | OidcRpError::InvalidState => StatusCode::UNAUTHORIZED,
            OidcRpError::UnknownUser(_) => StatusCode::NOT_FOUND,
            OidcRpError::InvalidUrl(_)
            | OidcRpError::MissingConfiguration(_)
            | OidcRpError::Discovery(_)
            | OidcRpError::ClaimsDecode(_)
            | OidcRpError::HttpClient(_)
            | OidcRpError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the ID Token was rejected, whichever check failed.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            OidcRpError::Verification(_)
                | OidcRpError::KeyNotFound(_)
                | OidcRpError::UnsupportedAlgorithm(_)
                | OidcRpError::NonceMismatch
        )
    }

    /// Whether the failure points at our own deployment rather than the request.
    pub fn is_server_fault(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<jsonwebtoken::errors::Error> for OidcRpError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        OidcRpError::Verification(e.to_string())
    }
}

impl IntoResponse for OidcRpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Server faults are logged in full; the client only learns that something broke.
        let body = if self.is_server_fault() {
            error!(error = %self, "request failed on the server side");
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };
        (status, body).into_response()
    }
}
