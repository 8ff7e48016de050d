// src/config.rs

use crate::cache::IssuerLoadParams;
use crate::error::NilaJwtError;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Contains the validation settings applied by the signature engine.
///
/// This struct is used to configure the time-based and audience checks that
/// are performed on a token's claims once its signature has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidationDetails {
    /// The tolerance for clock skew when validating `exp` and `nbf`.
    /// Defaults to 60 seconds.
    #[serde(with = "duration_secs")]
    pub leeway: Duration,
    /// Whether `exp` must be present and in the future. Defaults to `true`.
    pub validate_exp: bool,
    /// Whether `nbf`, when present, must be in the past. Defaults to `false`.
    pub validate_nbf: bool,
    /// Accepted `aud` values. `None` disables the audience check.
    pub audiences: Option<Vec<String>>,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            leeway: Duration::from_secs(60),
            validate_exp: true,
            validate_nbf: false,
            audiences: None,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// The main configuration for the `nila-jwt` validator.
///
/// Lists the issuers to load into the cache at startup and the validation
/// settings for signature-verified tokens. Build it with [`ConfigBuilder`]
/// or deserialize it from a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub issuers: Vec<IssuerLoadParams>,
    pub validation: ValidationDetails,
}

impl Config {
    /// Checks that every issuer has a non-empty, unique URL.
    pub fn validate(&self) -> Result<(), NilaJwtError> {
        let mut seen = HashSet::new();
        for issuer in &self.issuers {
            if issuer.issuer_url.is_empty() {
                return Err(NilaJwtError::InvalidConfiguration(
                    "an issuer is configured with an empty issuer_url".to_string(),
                ));
            }
            if !seen.insert(issuer.issuer_url.as_str()) {
                return Err(NilaJwtError::InvalidConfiguration(format!(
                    "issuer '{}' is configured more than once",
                    issuer.issuer_url
                )));
            }
        }
        Ok(())
    }
}

/// A builder for creating a `Config` instance.
#[derive(Default)]
pub struct ConfigBuilder {
    issuers: Vec<IssuerLoadParams>,
    validation: ValidationDetails,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an issuer to load at startup.
    pub fn issuer(mut self, params: IssuerLoadParams) -> Self {
        self.issuers.push(params);
        self
    }

    /// Sets the clock skew tolerance. Defaults to 60 seconds.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    /// Enables or disables the `exp` check. Enabled by default.
    pub fn validate_exp(mut self, validate: bool) -> Self {
        self.validation.validate_exp = validate;
        self
    }

    /// Enables or disables the `nbf` check. Disabled by default.
    pub fn validate_nbf(mut self, validate: bool) -> Self {
        self.validation.validate_nbf = validate;
        self
    }

    /// Requires the token `aud` to contain one of `audiences`.
    pub fn audiences(mut self, audiences: Vec<String>) -> Self {
        self.validation.audiences = Some(audiences);
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if an issuer URL is empty or repeated.
    pub fn build(self) -> Result<Config, NilaJwtError> {
        let config = Config {
            issuers: self.issuers,
            validation: self.validation,
        };
        config.validate()?;
        Ok(config)
    }
}
