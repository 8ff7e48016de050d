// src/lib.rs

//! Access token validation against a cache of trusted OIDC issuers.
//!
//! Tokens are either verified locally with keys discovered from each
//! issuer's JWKS ([`validator::Validator::validate`]) or checked remotely at
//! the issuer's introspection endpoint ([`validator::Validator::introspect`]).

pub mod cache;
pub mod claims;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod http;
pub mod jwk;
pub mod model;
pub mod validator;

#[cfg(test)]
mod test_support;

/// The public prelude for the `nila-jwt` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::cache::{IssuerCache, IssuerLoadParams, IssuerRecord, LoadOutcome};
    pub use crate::claims::{UserIdentifiers, ValidatedClaims};
    pub use crate::config::{Config, ConfigBuilder, ValidationDetails};
    pub use crate::credentials::client_credential;
    pub use crate::engine::{JsonWebTokenEngine, KeySelector, SignatureEngine};
    pub use crate::error::{ErrorCategory, NilaJwtError};
    pub use crate::http::{HttpClient, HttpError, ReqwestHttpClient};
    pub use crate::validator::Validator;
}
