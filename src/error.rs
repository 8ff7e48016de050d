// src/error.rs

use thiserror::Error;

/// Coarse classification of a [`NilaJwtError`].
///
/// Callers use it to decide whether a failure is worth retrying later
/// (`Network`), points at a setup mistake (`Configuration`), or simply means
/// the presented token is not acceptable (`Validation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller handed us something malformed. Never retried.
    Input,
    /// The cache or an issuer was set up incorrectly.
    Configuration,
    /// Discovery, JWKS or introspection traffic failed. Recoverable.
    Network,
    /// The token was rejected.
    Validation,
}

/// The primary error type for the `nila-jwt` library.
#[derive(Debug, Error)]
pub enum NilaJwtError {
    /// The token text passed to the validator was empty.
    #[error("The token is empty")]
    EmptyToken,

    /// The token does not have the `header.payload.signature` shape, or its
    /// header/payload could not be decoded.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// A base64 or base64url segment was not well formed.
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    /// A request to the issuer cache was missing required data.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Discovery was disabled but some requested algorithms had no inline key.
    #[error("Issuer '{issuer}' has no inline key for {algorithms:?} and discovery is disabled")]
    IncompleteKeyConfiguration {
        issuer: String,
        algorithms: Vec<String>,
    },

    /// The issuer already has a resolved record in the cache.
    #[error("Issuer '{0}' is already in the cache")]
    AlreadyLoaded(String),

    /// No key builder exists for the given algorithm.
    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A JWK could not be turned into a usable public key.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The discovery document could not be fetched or was unusable.
    #[error("OIDC discovery failed for '{issuer}': {reason}")]
    DiscoveryFailed { issuer: String, reason: String },

    /// The JWKS document could not be fetched or was unusable.
    #[error("JWKS fetch failed from '{jwks_uri}': {reason}")]
    JwksFetchFailed { jwks_uri: String, reason: String },

    /// The JWKS held no signing key for any of the requested algorithms.
    #[error("No signing keys for {algorithms:?} found at '{jwks_uri}'")]
    NoMatchingKeys {
        jwks_uri: String,
        algorithms: Vec<String>,
    },

    /// The introspection endpoint could not be reached or answered garbage.
    #[error("Introspection request failed: {0}")]
    IntrospectionRequestFailed(String),

    /// The signature engine rejected the token signature.
    #[error("Token signature is invalid")]
    SignatureInvalid,

    /// The signature engine rejected the token for any other reason.
    #[error("Token is invalid: {0}")]
    TokenInvalid(String),

    /// The introspection endpoint reported `active: false`.
    #[error("Token is no longer active")]
    TokenInactive,

    /// The issuer holds no key for the token's algorithm.
    #[error("Algorithm '{alg}' is not supported by issuer '{issuer}'")]
    AlgorithmNotSupported { issuer: String, alg: String },

    /// The issuer is neither resolved nor resolvable right now.
    #[error("Issuer '{issuer}' is not loaded{}", pending_suffix(.pending))]
    IssuerNotLoaded { issuer: String, pending: bool },

    /// Looking up the issuer of an introspected token failed.
    #[error("Issuer '{issuer}' is unavailable: {source}")]
    IssuerUnavailable {
        issuer: String,
        #[source]
        source: Box<NilaJwtError>,
    },

    /// The issuer lacks what introspection needs (discovery document,
    /// client credential or `introspection_endpoint`).
    #[error("Introspection is not configured for issuer '{issuer}': {reason}")]
    IntrospectionUnconfigured { issuer: String, reason: String },

    /// A claim required by a helper accessor was missing or mistyped.
    #[error("A required grant is missing from the token: {0}")]
    MissingGrant(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn pending_suffix(pending: &bool) -> &'static str {
    if *pending {
        " but is still pending"
    } else {
        ""
    }
}

impl NilaJwtError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyToken
            | Self::MalformedToken(_)
            | Self::MalformedEncoding(_)
            | Self::InvalidRequest(_) => ErrorCategory::Input,

            Self::IncompleteKeyConfiguration { .. }
            | Self::AlreadyLoaded(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::InvalidKeyMaterial(_)
            | Self::InvalidConfiguration(_) => ErrorCategory::Configuration,

            Self::DiscoveryFailed { .. }
            | Self::JwksFetchFailed { .. }
            | Self::NoMatchingKeys { .. }
            | Self::IntrospectionRequestFailed(_) => ErrorCategory::Network,

            Self::SignatureInvalid
            | Self::TokenInvalid(_)
            | Self::TokenInactive
            | Self::AlgorithmNotSupported { .. }
            | Self::IssuerNotLoaded { .. }
            | Self::IssuerUnavailable { .. }
            | Self::IntrospectionUnconfigured { .. }
            | Self::MissingGrant(_) => ErrorCategory::Validation,
        }
    }

    /// True when re-attempting the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Network
    }
}
