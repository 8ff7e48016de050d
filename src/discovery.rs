// src/discovery.rs

use crate::error::NilaJwtError;
use crate::http::HttpClient;
use crate::jwk::build_pem_from_jwk;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Path appended to an issuer URL to reach its discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Key material and discovery document obtained for one issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIssuerKeys {
    /// Algorithm name -> SubjectPublicKeyInfo PEM.
    pub keys_by_algorithm: HashMap<String, String>,
    /// Raw JSON text of the discovery response.
    pub discovery_document: String,
}

/// Runs the two-hop discovery protocol (discovery document, then JWKS)
/// against an issuer.
#[derive(Clone)]
pub struct IssuerResolver {
    http_client: Arc<dyn HttpClient>,
}

impl IssuerResolver {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    /// Fetches the issuer's discovery document and JWKS and builds PEM keys
    /// for every requested algorithm a signing key exists for.
    ///
    /// Algorithm names are matched case-sensitively. An empty
    /// `algs_to_fetch` still fetches both documents so the discovery
    /// document can be kept for introspection.
    #[instrument(skip(self, algs_to_fetch), err)]
    pub async fn resolve(
        &self,
        issuer_url: &str,
        algs_to_fetch: &HashSet<String>,
    ) -> Result<ResolvedIssuerKeys, NilaJwtError> {
        let (discovery_document, jwks_uri) = self.fetch_discovery_document(issuer_url).await?;
        let jwks = self.fetch_jwks(&jwks_uri).await?;

        let keys_by_algorithm = select_signing_keys(&jwks_uri, &jwks, algs_to_fetch)?;

        if keys_by_algorithm.is_empty() && !algs_to_fetch.is_empty() {
            let mut algorithms: Vec<String> = algs_to_fetch.iter().cloned().collect();
            algorithms.sort();
            return Err(NilaJwtError::NoMatchingKeys { jwks_uri, algorithms });
        }

        info!(
            issuer = %issuer_url,
            algorithms = ?keys_by_algorithm.keys().collect::<Vec<_>>(),
            "resolved issuer keys"
        );

        Ok(ResolvedIssuerKeys {
            keys_by_algorithm,
            discovery_document,
        })
    }

    /// GETs `{issuer_url}/.well-known/openid-configuration` and returns the
    /// raw document together with its `jwks_uri`.
    ///
    /// Only `jwks_uri` is read here. Other members, `introspection_endpoint`
    /// included, are left for whoever uses them.
    async fn fetch_discovery_document(&self, issuer_url: &str) -> Result<(String, String), NilaJwtError> {
        let discovery_url = format!("{}{}", issuer_url, DISCOVERY_PATH);
        let failed = |reason: String| NilaJwtError::DiscoveryFailed {
            issuer: issuer_url.to_string(),
            reason,
        };

        debug!("Performing OIDC discovery at: {}", discovery_url);
        let body = self
            .http_client
            .get(&discovery_url)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if body.is_empty() {
            return Err(failed("empty discovery document".to_string()));
        }

        let document: Value = serde_json::from_str(&body)
            .map_err(|e| failed(format!("discovery document is not JSON: {}", e)))?;
        let jwks_uri = document
            .get("jwks_uri")
            .and_then(Value::as_str)
            .ok_or_else(|| failed("missing string 'jwks_uri'".to_string()))?
            .to_string();

        Ok((body, jwks_uri))
    }

    /// GETs the JWKS and returns it as a JSON object.
    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<Value, NilaJwtError> {
        let failed = |reason: String| NilaJwtError::JwksFetchFailed {
            jwks_uri: jwks_uri.to_string(),
            reason,
        };

        debug!("Fetching JWKS from: {}", jwks_uri);
        let body = self
            .http_client
            .get(jwks_uri)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if body.is_empty() {
            return Err(failed("empty JWKS document".to_string()));
        }

        let jwks: Value =
            serde_json::from_str(&body).map_err(|e| failed(format!("invalid JSON: {}", e)))?;
        if !jwks.is_object() {
            return Err(failed("JWKS is not a JSON object".to_string()));
        }
        Ok(jwks)
    }
}

/// Picks the signing keys for `algs_to_fetch` out of a JWKS document and
/// builds their PEM text.
///
/// A `keys` array is treated as a JWK Set whose members must all carry
/// `alg` and `use`; only `use == "sig"` entries are kept and a later entry
/// for the same algorithm replaces an earlier one. Without a `keys` array
/// the document itself is a single JWK whose `alg` must be requested.
/// Entries whose key material cannot be built are skipped.
pub fn select_signing_keys(
    jwks_uri: &str,
    jwks: &Value,
    algs_to_fetch: &HashSet<String>,
) -> Result<HashMap<String, String>, NilaJwtError> {
    let failed = |reason: &str| NilaJwtError::JwksFetchFailed {
        jwks_uri: jwks_uri.to_string(),
        reason: reason.to_string(),
    };

    let mut keys_by_algorithm = HashMap::new();

    if let Some(keys) = jwks.get("keys").and_then(Value::as_array) {
        debug!("JWKS holds {} keys", keys.len());
        for key in keys {
            if !key.is_object() {
                return Err(failed("JWK set entry is not an object"));
            }
            let alg = key
                .get("alg")
                .and_then(Value::as_str)
                .ok_or_else(|| failed("JWK set entry is missing 'alg'"))?;
            let key_use = key
                .get("use")
                .and_then(Value::as_str)
                .ok_or_else(|| failed("JWK set entry is missing 'use'"))?;

            if key_use == "sig" && algs_to_fetch.contains(alg) {
                insert_built_key(&mut keys_by_algorithm, alg, key);
            }
        }
    } else {
        let alg = jwks
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| failed("JWKS has neither 'keys' nor 'alg'"))?;
        if !algs_to_fetch.contains(alg) {
            return Err(failed("the only key's alg was not requested"));
        }
        insert_built_key(&mut keys_by_algorithm, alg, jwks);
    }

    Ok(keys_by_algorithm)
}

fn insert_built_key(keys_by_algorithm: &mut HashMap<String, String>, alg: &str, key: &Value) {
    match build_pem_from_jwk(alg, key) {
        Ok(pem) => {
            keys_by_algorithm.insert(alg.to_string(), pem);
        }
        Err(e) => warn!(alg = %alg, error = %e, "skipping unusable JWK"),
    }
}
