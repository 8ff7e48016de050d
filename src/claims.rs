// src/claims.rs

use crate::error::NilaJwtError;
use jsonwebtoken::{Header, TokenData};
use serde_json::Value;
use std::collections::BTreeSet;

/// The claims of an accepted token.
///
/// `Verified` comes out of local signature verification and keeps the JOSE
/// header; `Introspected` is the raw payload of a token the issuer reported
/// as active.
#[derive(Debug, Clone)]
pub enum ValidatedClaims {
    Verified { header: Header, claims: Value },
    Introspected(Value),
}

/// Identity fields commonly read off an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentifiers {
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub sub: Option<String>,
}

impl From<TokenData<Value>> for ValidatedClaims {
    fn from(data: TokenData<Value>) -> Self {
        Self::Verified {
            header: data.header,
            claims: data.claims,
        }
    }
}

impl ValidatedClaims {
    /// The full claim set.
    pub fn claims(&self) -> &Value {
        match self {
            Self::Verified { claims, .. } => claims,
            Self::Introspected(claims) => claims,
        }
    }

    /// The verified JOSE header. Introspected tokens have none.
    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::Verified { header, .. } => Some(header),
            Self::Introspected(_) => None,
        }
    }

    pub fn is_introspected(&self) -> bool {
        matches!(self, Self::Introspected(_))
    }

    fn grant(&self, name: &str) -> Option<&Value> {
        if name.is_empty() {
            return None;
        }
        self.claims().get(name)
    }

    pub fn grant_str(&self, name: &str) -> Option<&str> {
        self.grant(name).and_then(Value::as_str)
    }

    pub fn grant_bool(&self, name: &str) -> Option<bool> {
        self.grant(name).and_then(Value::as_bool)
    }

    pub fn grant_int(&self, name: &str) -> Option<i64> {
        self.grant(name).and_then(Value::as_i64)
    }

    /// The grant serialised as compact JSON text, whatever its type.
    pub fn grant_json(&self, name: &str) -> Option<String> {
        self.grant(name).map(Value::to_string)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.grant_str("iss")
    }

    /// Dumps the claim set as JSON text.
    pub fn to_json_string(&self, pretty: bool) -> String {
        let claims = self.claims();
        if pretty {
            serde_json::to_string_pretty(claims).unwrap_or_else(|_| claims.to_string())
        } else {
            claims.to_string()
        }
    }

    /// Reads `preferred_username`, `email`, `email_verified` and `sub`.
    ///
    /// # Errors
    ///
    /// `MissingGrant` naming the first required grant that is absent or of
    /// the wrong type. `sub` is optional.
    pub fn identifiers(&self) -> Result<UserIdentifiers, NilaJwtError> {
        let required_str = |name: &str| {
            self.grant_str(name)
                .map(str::to_string)
                .ok_or_else(|| NilaJwtError::MissingGrant(name.to_string()))
        };

        Ok(UserIdentifiers {
            username: required_str("preferred_username")?,
            email: required_str("email")?,
            email_verified: self
                .grant_bool("email_verified")
                .ok_or_else(|| NilaJwtError::MissingGrant("email_verified".to_string()))?,
            sub: self.grant_str("sub").map(str::to_string),
        })
    }

    /// The space-separated members of the `scope` grant.
    pub fn scopes(&self) -> Result<BTreeSet<String>, NilaJwtError> {
        let scope = self
            .grant_str("scope")
            .ok_or_else(|| NilaJwtError::MissingGrant("scope".to_string()))?;
        Ok(scope.split_whitespace().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    fn introspected() -> ValidatedClaims {
        ValidatedClaims::Introspected(json!({
            "iss": "https://idp.example",
            "sub": "248289761001",
            "preferred_username": "jdoe",
            "email": "jdoe@example.com",
            "email_verified": true,
            "exp": 1_700_000_000,
            "scope": "openid  profile email",
            "realm_access": { "roles": ["admin"] }
        }))
    }

    #[test]
    fn typed_grant_accessors() {
        let claims = introspected();
        assert_eq!(claims.grant_str("iss"), Some("https://idp.example"));
        assert_eq!(claims.grant_bool("email_verified"), Some(true));
        assert_eq!(claims.grant_int("exp"), Some(1_700_000_000));
        assert_eq!(
            claims.grant_json("realm_access").as_deref(),
            Some(r#"{"roles":["admin"]}"#)
        );

        assert_eq!(claims.grant_str("exp"), None);
        assert_eq!(claims.grant_int("missing"), None);
        assert_eq!(claims.grant_str(""), None);
        assert_eq!(claims.grant_json(""), None);
    }

    #[test]
    fn identifiers_and_scopes() {
        let claims = introspected();
        let ids = claims.identifiers().unwrap();
        assert_eq!(ids.username, "jdoe");
        assert_eq!(ids.email, "jdoe@example.com");
        assert!(ids.email_verified);
        assert_eq!(ids.sub.as_deref(), Some("248289761001"));

        let scopes: Vec<_> = claims.scopes().unwrap().into_iter().collect();
        assert_eq!(scopes, vec!["email", "openid", "profile"]);
    }

    #[test]
    fn missing_grants_are_named() {
        let claims = ValidatedClaims::Introspected(json!({ "preferred_username": "jdoe" }));
        assert!(matches!(claims.identifiers(), Err(NilaJwtError::MissingGrant(g)) if g == "email"));
        assert!(matches!(claims.scopes(), Err(NilaJwtError::MissingGrant(g)) if g == "scope"));
    }

    #[test]
    fn verified_claims_keep_their_header() {
        let claims = ValidatedClaims::Verified {
            header: Header::new(Algorithm::RS256),
            claims: json!({ "iss": "https://idp.example" }),
        };
        assert_eq!(claims.header().map(|h| h.alg), Some(Algorithm::RS256));
        assert!(!claims.is_introspected());
        assert!(introspected().header().is_none());
    }

    #[test]
    fn json_dump() {
        let claims = ValidatedClaims::Introspected(json!({ "iss": "x" }));
        assert_eq!(claims.to_json_string(false), r#"{"iss":"x"}"#);
        assert!(claims.to_json_string(true).contains('\n'));
    }
}
