// src/verifier.rs

use crate::claims::IdentityClaims;
use crate::config::ValidationDetails;
use crate::discovery::ProviderDescriptor;
use crate::error::OidcRpError;
use jsonwebtoken::{decode, decode_header, Validation};
use serde_json::Value;
use tracing::{debug, instrument};

/// An ID Token whose signature and standard claims have been checked.
///
/// Only `IdTokenVerifier::verify` constructs this type, so holding one is proof
/// that the payload came from the provider.
#[derive(Debug, Clone)]
pub struct VerifiedIdToken {
    payload: Value,
}

impl VerifiedIdToken {
    /// The `nonce` claim, if the provider echoed one.
    pub fn nonce(&self) -> Option<&str> {
        self.payload.get("nonce").and_then(Value::as_str)
    }

    /// Decodes the verified payload into `IdentityClaims`.
    pub fn claims(&self) -> Result<IdentityClaims, OidcRpError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| OidcRpError::ClaimsDecode(e.to_string()))
    }
}

/// The OIDC ID Token verifier.
///
/// This struct is initialized with the client id and validation settings and
/// should be created once and reused for all verification requests. Keys and
/// issuer come from the `ProviderDescriptor` handed to each call.
#[derive(Debug, Clone)]
pub struct IdTokenVerifier {
    client_id: String,
    validation: ValidationDetails,
}

impl IdTokenVerifier {
    pub fn new(client_id: String, validation: ValidationDetails) -> Self {
        Self {
            client_id,
            validation,
        }
    }

    /// Verifies a raw ID Token.
    ///
    /// This method performs a full validation of the token, including:
    /// 1. Signature verification against the provider's published keys.
    /// 2. Validation of standard claims (`iss`, `aud`, `exp`, `sub`).
    /// 3. Nonce validation, when the login flow carried one.
    ///
    /// Returns `OidcRpError::KeyNotFound` when the token's `kid` is not published;
    /// callers may refresh the descriptor and retry.
    #[instrument(skip(self, provider, raw_token, expected_nonce), err)]
    pub fn verify(
        &self,
        provider: &ProviderDescriptor,
        raw_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<VerifiedIdToken, OidcRpError> {
        // 1. Decode header to get kid and alg without validation.
        let header = decode_header(raw_token)?;

        // 2. Check if the algorithm is allowed.
        if !self.validation.algorithms.contains(&header.alg) {
            return Err(OidcRpError::UnsupportedAlgorithm(header.alg));
        }

        // 3. Pick the candidate keys.
        let candidates = provider.keys_for(header.kid.as_deref());
        if candidates.is_empty() {
            return Err(OidcRpError::KeyNotFound(
                header.kid.unwrap_or_else(|| "<none>".to_string()),
            ));
        }

        // 4. Construct validation options.
        let mut validation = Validation::new(header.alg);
        validation.leeway = self.validation.leeway.as_secs();
        validation.set_issuer(&[provider.issuer.as_str()]);
        validation.set_audience(&[&self.client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        // 5. Decode and validate the token. Without a kid any published key may match.
        let mut last_error = None;
        let mut payload = None;
        for key in candidates {
            match decode::<Value>(raw_token, key, &validation) {
                Ok(data) => {
                    payload = Some(data.claims);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let payload = match (payload, last_error) {
            (Some(payload), _) => payload,
            (None, Some(e)) => return Err(e.into()),
            (None, None) => {
                return Err(OidcRpError::Verification("no usable signing key".to_string()))
            }
        };

        let verified = VerifiedIdToken { payload };

        // 6. Validate the nonce if the flow carried one.
        if let Some(expected) = expected_nonce {
            match verified.nonce() {
                Some(actual) if actual == expected => {}
                actual => {
                    debug!("Nonce mismatch. Expected: {:?}, Actual: {:?}", expected, actual);
                    return Err(OidcRpError::NonceMismatch);
                }
            }
        }

        Ok(verified)
    }
}
