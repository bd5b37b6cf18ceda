// src/lib.rs

//! OpenID Connect relying party.
//!
//! Sends users to the identity provider, exchanges the returned authorization
//! code, verifies the ID Token against the provider's published keys and keeps
//! the resulting tokens in HTTP-only cookies.

pub mod claims;
pub mod client;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod model;
pub mod server;
pub mod session;
pub mod verifier;

/// The public prelude for the `oidc-rp` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::claims::IdentityClaims;
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::directory::{InMemoryDirectory, UserDirectory, UserRecord};
    pub use crate::error::OidcRpError;
    pub use crate::flow::RelyingParty;
    pub use crate::session::{SessionCodec, TokenBundle};
    pub use jsonwebtoken::Algorithm;
}
