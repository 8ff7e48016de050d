// src/jwk.rs

use crate::codec::decode_base64_url;
use crate::error::NilaJwtError;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{BigUint, RsaPublicKey};
use serde_json::Value;
use tracing::trace;

/// Algorithms [`build_pem_from_jwk`] knows how to build keys for.
pub const SUPPORTED_ALGORITHMS: [&str; 3] = ["RS256", "RS384", "RS512"];

/// Converts a JSON Web Key into SubjectPublicKeyInfo PEM text for `alg`.
///
/// # Errors
///
/// `UnsupportedAlgorithm` for anything but `RS256`/`RS384`/`RS512`;
/// `InvalidKeyMaterial` when `n`/`e` are missing, undecodable, empty, or do
/// not form a valid RSA public key.
pub fn build_pem_from_jwk(alg: &str, jwk: &Value) -> Result<String, NilaJwtError> {
    match alg {
        "RS256" | "RS384" | "RS512" => build_rsa_pem(jwk),
        other => Err(NilaJwtError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn build_rsa_pem(jwk: &Value) -> Result<String, NilaJwtError> {
    let n = rsa_component(jwk, "n")?;
    let e = rsa_component(jwk, "e")?;

    let public_key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
        .map_err(|e| NilaJwtError::InvalidKeyMaterial(format!("RSA key rejected: {}", e)))?;

    let pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| NilaJwtError::InvalidKeyMaterial(format!("PEM serialization failed: {}", e)))?;
    if pem.is_empty() {
        return Err(NilaJwtError::InvalidKeyMaterial("PEM serialization was empty".to_string()));
    }

    trace!(modulus_bytes = n.len(), "built RSA public key PEM from JWK");
    Ok(pem)
}

/// Reads and decodes one big-endian RSA component (`n` or `e`).
fn rsa_component(jwk: &Value, member: &str) -> Result<Vec<u8>, NilaJwtError> {
    let encoded = jwk
        .get(member)
        .and_then(Value::as_str)
        .ok_or_else(|| NilaJwtError::InvalidKeyMaterial(format!("RSA key missing '{}' component", member)))?;

    let bytes = decode_base64_url(encoded).map_err(|e| {
        NilaJwtError::InvalidKeyMaterial(format!("failed to decode '{}': {}", member, e))
    })?;
    if bytes.is_empty() {
        return Err(NilaJwtError::InvalidKeyMaterial(format!("'{}' component is empty", member)));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_jwk, test_public_key_pem};
    use rsa::pkcs8::DecodePublicKey;
    use serde_json::json;

    #[test]
    fn builds_spki_pem_for_every_rs_algorithm() {
        for alg in SUPPORTED_ALGORITHMS {
            let pem = build_pem_from_jwk(alg, &test_jwk(alg, "sig")).unwrap();
            assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
            assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
            assert_eq!(pem, test_public_key_pem());
            assert!(RsaPublicKey::from_public_key_pem(&pem).is_ok());
        }
    }

    #[test]
    fn rejects_unknown_algorithms() {
        for alg in ["ES256", "HS256", "rs256", ""] {
            assert!(matches!(
                build_pem_from_jwk(alg, &test_jwk("RS256", "sig")),
                Err(NilaJwtError::UnsupportedAlgorithm(a)) if a == alg
            ));
        }
    }

    #[test]
    fn rejects_missing_or_empty_components() {
        let mut jwk = test_jwk("RS256", "sig");
        jwk.as_object_mut().unwrap().remove("e");
        assert!(matches!(
            build_pem_from_jwk("RS256", &jwk),
            Err(NilaJwtError::InvalidKeyMaterial(_))
        ));

        let empty_n = json!({ "n": "", "e": "AQAB" });
        assert!(matches!(
            build_pem_from_jwk("RS384", &empty_n),
            Err(NilaJwtError::InvalidKeyMaterial(_))
        ));

        let bad_n = json!({ "n": "a", "e": "AQAB" });
        assert!(matches!(
            build_pem_from_jwk("RS512", &bad_n),
            Err(NilaJwtError::InvalidKeyMaterial(_))
        ));

        let numeric_e = json!({ "n": "AQAB", "e": 65537 });
        assert!(matches!(
            build_pem_from_jwk("RS256", &numeric_e),
            Err(NilaJwtError::InvalidKeyMaterial(_))
        ));
    }
}
