// src/validator.rs

use crate::cache::{IssuerCache, LoadOutcome};
use crate::claims::ValidatedClaims;
use crate::codec::DecomposedToken;
use crate::config::Config;
use crate::engine::{JsonWebTokenEngine, SignatureEngine};
use crate::error::NilaJwtError;
use crate::http::HttpClient;
use crate::model::{IntrospectionResponse, OidcDiscoveryDocument};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Token-type hint sent with every introspection request.
const INTROSPECTION_TOKEN_TYPE_HINT: &str = "requesting_party_token";

/// The access token validator.
///
/// Holds the issuer cache, the HTTP transport used for introspection and
/// the signature engine. It is cheap to clone; create it once at startup
/// (see [`Validator::bootstrap`]) and share it between request handlers.
#[derive(Clone)]
pub struct Validator {
    cache: Arc<IssuerCache>,
    http_client: Arc<dyn HttpClient>,
    engine: Arc<dyn SignatureEngine>,
}

impl Validator {
    /// Wires a validator from already constructed parts.
    pub fn new(
        cache: Arc<IssuerCache>,
        http_client: Arc<dyn HttpClient>,
        engine: Arc<dyn SignatureEngine>,
    ) -> Self {
        Self {
            cache,
            http_client,
            engine,
        }
    }

    /// Builds the cache and the default engine from `config` and loads every
    /// configured issuer.
    ///
    /// Issuers whose discovery fails are left pending and retried on first
    /// use; any other load failure aborts the bootstrap.
    #[instrument(skip_all, fields(issuers = config.issuers.len()), err)]
    pub async fn bootstrap(config: Config, http_client: Arc<dyn HttpClient>) -> Result<Self, NilaJwtError> {
        config.validate()?;

        let cache = Arc::new(IssuerCache::new(Arc::clone(&http_client)));
        for params in config.issuers {
            let issuer = params.issuer_url.clone();
            match cache.load_issuer(params).await? {
                LoadOutcome::Resolved => debug!(issuer = %issuer, "issuer ready"),
                LoadOutcome::Pending => warn!(issuer = %issuer, "issuer pending after bootstrap"),
            }
        }
        info!("validator bootstrapped");

        let engine = Arc::new(JsonWebTokenEngine::new(config.validation));
        Ok(Self::new(cache, http_client, engine))
    }

    /// The issuer cache backing this validator.
    pub fn cache(&self) -> &Arc<IssuerCache> {
        &self.cache
    }

    /// Verifies the token's signature locally with the key of its issuer.
    ///
    /// The issuer (`iss`) must be loaded in the cache, or pending and
    /// resolvable now, and must hold a key for the token's `alg`.
    #[instrument(skip_all, err)]
    pub async fn validate(&self, token: &str) -> Result<ValidatedClaims, NilaJwtError> {
        if token.is_empty() {
            return Err(NilaJwtError::EmptyToken);
        }

        match self.engine.decode_verified(token, &*self.cache).await {
            Ok(data) => {
                debug!(alg = ?data.header.alg, "token signature verified");
                Ok(ValidatedClaims::from(data))
            }
            Err(e) => {
                error!(error = %e, category = ?e.category(), "token rejected");
                Err(e)
            }
        }
    }

    /// Asks the token's issuer whether the token is still active.
    ///
    /// The issuer must have been loaded with discovery pulled down (for its
    /// `introspection_endpoint`) and a client credential. The claims returned
    /// are the token's own payload, not the introspection response.
    #[instrument(skip_all, err)]
    pub async fn introspect(&self, token: &str) -> Result<ValidatedClaims, NilaJwtError> {
        let decomposed = DecomposedToken::parse(token)?;
        let payload: Value = serde_json::from_str(&decomposed.payload)
            .map_err(|e| NilaJwtError::MalformedToken(format!("payload is not JSON: {}", e)))?;
        let issuer = payload
            .get("iss")
            .and_then(Value::as_str)
            .ok_or_else(|| NilaJwtError::MalformedToken("missing string 'iss' claim".to_string()))?
            .to_string();

        let record = self
            .cache
            .get_issuer(&issuer)
            .await
            .map_err(|e| NilaJwtError::IssuerUnavailable {
                issuer: issuer.clone(),
                source: Box::new(e),
            })?;

        let unconfigured = |reason: &str| NilaJwtError::IntrospectionUnconfigured {
            issuer: issuer.clone(),
            reason: reason.to_string(),
        };
        if record.discovery_document().is_empty() {
            return Err(unconfigured("no discovery document was pulled down"));
        }
        let credential = record
            .client_credential()
            .ok_or_else(|| unconfigured("no client credential"))?;
        let endpoint = serde_json::from_str::<OidcDiscoveryDocument>(record.discovery_document())
            .ok()
            .and_then(|doc| doc.introspection_endpoint)
            .ok_or_else(|| unconfigured("discovery document has no introspection_endpoint"))?;

        let body = format!(
            "token_type_hint={}&token={}",
            INTROSPECTION_TOKEN_TYPE_HINT, token
        );
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Basic {}", credential));
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("Accept".to_string(), "application/json".to_string());

        debug!(endpoint = %endpoint, issuer = %issuer, "introspecting token");
        let response = self
            .http_client
            .post(&endpoint, &body, &headers)
            .await
            .map_err(|e| NilaJwtError::IntrospectionRequestFailed(e.to_string()))?;

        let response: IntrospectionResponse = serde_json::from_str(&response).map_err(|e| {
            NilaJwtError::IntrospectionRequestFailed(format!("unexpected introspection response: {}", e))
        })?;

        if !response.active {
            warn!(issuer = %issuer, "issuer reports token inactive");
            return Err(NilaJwtError::TokenInactive);
        }
        Ok(ValidatedClaims::Introspected(payload))
    }
}
