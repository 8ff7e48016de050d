// src/model.rs

use serde::Deserialize;

/// The parts of an OIDC provider's discovery document this crate reads.
/// Found at the `.well-known/openid-configuration` endpoint.
#[derive(Debug, Deserialize)]
pub struct OidcDiscoveryDocument {
    pub jwks_uri: String,
    /// RFC 7662 token introspection endpoint, if the provider offers one.
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
}

/// Represents a token introspection response (RFC 7662).
///
/// Only `active` is interpreted; the remaining members are ignored.
#[derive(Debug, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
}
