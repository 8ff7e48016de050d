// src/engine.rs

use crate::codec::DecomposedToken;
use crate::config::ValidationDetails;
use crate::error::NilaJwtError;
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, TokenData, Validation};
use serde_json::Value;
use tracing::{debug, instrument};

/// A token decoded without any signature check.
///
/// This is what a [`KeySelector`] gets to look at while choosing a key.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    pub header: Header,
    pub claims: Value,
}

impl UnverifiedToken {
    /// The non-empty `iss` claim, if present.
    pub fn issuer(&self) -> Option<&str> {
        self.claims
            .get("iss")
            .and_then(Value::as_str)
            .filter(|iss| !iss.is_empty())
    }

    /// The header algorithm as its JOSE name, e.g. `"RS256"`.
    pub fn algorithm(&self) -> String {
        format!("{:?}", self.header.alg)
    }
}

/// Key-selection callback consulted by a [`SignatureEngine`] while verifying.
#[async_trait]
pub trait KeySelector: Send + Sync {
    /// Returns the key bytes (PEM text for asymmetric algorithms) that should
    /// verify `token`.
    async fn select_key(&self, token: &UnverifiedToken) -> Result<Vec<u8>, NilaJwtError>;
}

/// Signature verification engine.
#[async_trait]
pub trait SignatureEngine: Send + Sync {
    /// Decodes header and claims without verifying anything.
    fn decode_unverified(&self, token: &str) -> Result<UnverifiedToken, NilaJwtError>;

    /// Decodes `token`, asks `selector` for the key, and verifies signature
    /// and time-based claims.
    async fn decode_verified(
        &self,
        token: &str,
        selector: &dyn KeySelector,
    ) -> Result<TokenData<Value>, NilaJwtError>;
}

/// [`SignatureEngine`] built on the `jsonwebtoken` crate.
#[derive(Debug, Clone, Default)]
pub struct JsonWebTokenEngine {
    details: ValidationDetails,
}

impl JsonWebTokenEngine {
    pub fn new(details: ValidationDetails) -> Self {
        Self { details }
    }

    fn validation_for(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.details.leeway.as_secs();
        validation.validate_exp = self.details.validate_exp;
        validation.validate_nbf = self.details.validate_nbf;

        // Only `exp` is ever mandatory, and only when it is being checked.
        validation.required_spec_claims.clear();
        if self.details.validate_exp {
            validation.required_spec_claims.insert("exp".to_string());
        }

        match &self.details.audiences {
            Some(audiences) => validation.set_audience(audiences),
            None => validation.validate_aud = false,
        }
        validation
    }
}

/// Builds a `DecodingKey` from key bytes according to the algorithm family.
fn decoding_key_for(alg: Algorithm, key: &[u8]) -> Result<DecodingKey, NilaJwtError> {
    let result = match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(DecodingKey::from_secret(key)),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(key),
        _ => DecodingKey::from_rsa_pem(key),
    };
    result.map_err(|e| NilaJwtError::InvalidKeyMaterial(format!("unusable {:?} key: {}", alg, e)))
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> NilaJwtError {
    match e.kind() {
        ErrorKind::InvalidSignature => NilaJwtError::SignatureInvalid,
        _ => NilaJwtError::TokenInvalid(e.to_string()),
    }
}

#[async_trait]
impl SignatureEngine for JsonWebTokenEngine {
    fn decode_unverified(&self, token: &str) -> Result<UnverifiedToken, NilaJwtError> {
        let header = decode_header(token).map_err(map_jwt_error)?;

        let decomposed =
            DecomposedToken::parse(token).map_err(|e| NilaJwtError::TokenInvalid(e.to_string()))?;
        let claims: Value = serde_json::from_str(&decomposed.payload)
            .map_err(|e| NilaJwtError::TokenInvalid(format!("payload is not JSON: {}", e)))?;
        if !claims.is_object() {
            return Err(NilaJwtError::TokenInvalid("payload is not a JSON object".to_string()));
        }

        Ok(UnverifiedToken { header, claims })
    }

    #[instrument(skip_all, err)]
    async fn decode_verified(
        &self,
        token: &str,
        selector: &dyn KeySelector,
    ) -> Result<TokenData<Value>, NilaJwtError> {
        let unverified = self.decode_unverified(token)?;
        let alg = unverified.header.alg;

        let key_bytes = selector.select_key(&unverified).await?;
        let decoding_key = decoding_key_for(alg, &key_bytes)?;

        debug!(alg = ?alg, iss = ?unverified.issuer(), "verifying token signature");
        decode::<Value>(token, &decoding_key, &self.validation_for(alg)).map_err(map_jwt_error)
    }
}
