// src/cache.rs

//! The issuer key cache.
//!
//! Every issuer the process trusts lives here, either resolved (an
//! [`IssuerRecord`] with its keys) or pending (the [`IssuerLoadParams`] of a
//! load whose discovery failed and that is retried on first lookup). An
//! issuer is never in both maps at once.
//!
//! All operations take one `tokio::sync::Mutex` for their full duration,
//! including the discovery/JWKS calls made while loading or retrying an
//! issuer. Lookups for unrelated issuers therefore queue behind a slow
//! resolution, and since no timeout is applied here a hung fetch blocks the
//! whole cache. Use a `ReqwestHttpClient::with_timeout` transport to bound it.

use crate::discovery::IssuerResolver;
use crate::engine::{KeySelector, UnverifiedToken};
use crate::error::NilaJwtError;
use crate::http::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Parameters for loading one issuer into the cache.
///
/// Each entry of `alg_to_key_pem` with a non-empty PEM is used verbatim;
/// an empty PEM asks for that algorithm's key to be discovered from the
/// issuer's JWKS, which requires `pulldown_discovery`.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssuerLoadParams {
    pub issuer_url: String,
    /// Opaque credential sent as `Authorization: Basic <credential>` when
    /// introspecting. See [`crate::credentials::client_credential`].
    #[serde(default)]
    pub client_credential: Option<String>,
    #[serde(default)]
    pub alg_to_key_pem: HashMap<String, String>,
    /// Fetch the discovery document (and the JWKS) at load time.
    #[serde(default)]
    pub pulldown_discovery: bool,
}

impl IssuerLoadParams {
    pub fn new(issuer_url: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            ..Self::default()
        }
    }

    /// Supplies the PEM for `alg` inline.
    pub fn with_key(mut self, alg: impl Into<String>, key_pem: impl Into<String>) -> Self {
        self.alg_to_key_pem.insert(alg.into(), key_pem.into());
        self
    }

    /// Requests that the key for `alg` be discovered from the JWKS.
    pub fn fetch_key(self, alg: impl Into<String>) -> Self {
        self.with_key(alg, String::new())
    }

    pub fn with_client_credential(mut self, credential: impl Into<String>) -> Self {
        self.client_credential = Some(credential.into());
        self
    }

    pub fn pulldown_discovery(mut self, pulldown: bool) -> Self {
        self.pulldown_discovery = pulldown;
        self
    }
}

impl fmt::Debug for IssuerLoadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerLoadParams")
            .field("issuer_url", &self.issuer_url)
            .field("client_credential", &self.client_credential.as_ref().map(|_| "<redacted>"))
            .field("algorithms", &self.alg_to_key_pem.keys().collect::<Vec<_>>())
            .field("pulldown_discovery", &self.pulldown_discovery)
            .finish()
    }
}

/// One fully resolved issuer. Never mutated once it is in the cache.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuerRecord {
    issuer_url: String,
    keys_by_algorithm: HashMap<String, String>,
    client_credential: Option<String>,
    discovery_document: String,
}

impl IssuerRecord {
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    pub fn keys_by_algorithm(&self) -> &HashMap<String, String> {
        &self.keys_by_algorithm
    }

    pub fn alg_is_supported(&self, alg: &str) -> bool {
        self.keys_by_algorithm.contains_key(alg)
    }

    /// The PEM key for `alg`, or `AlgorithmNotSupported`.
    pub fn key_pem_for_alg(&self, alg: &str) -> Result<&str, NilaJwtError> {
        self.keys_by_algorithm
            .get(alg)
            .map(String::as_str)
            .ok_or_else(|| NilaJwtError::AlgorithmNotSupported {
                issuer: self.issuer_url.clone(),
                alg: alg.to_string(),
            })
    }

    /// The introspection client credential. Empty credentials read as `None`.
    pub fn client_credential(&self) -> Option<&str> {
        self.client_credential.as_deref().filter(|c| !c.is_empty())
    }

    /// Raw discovery JSON; empty when discovery was never pulled down.
    pub fn discovery_document(&self) -> &str {
        &self.discovery_document
    }
}

impl fmt::Debug for IssuerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerRecord")
            .field("issuer_url", &self.issuer_url)
            .field("algorithms", &self.keys_by_algorithm.keys().collect::<Vec<_>>())
            .field("client_credential", &self.client_credential.as_ref().map(|_| "<redacted>"))
            .field("has_discovery_document", &!self.discovery_document.is_empty())
            .finish()
    }
}

/// What [`IssuerCache::load_issuer`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The issuer's keys are in the cache.
    Resolved,
    /// Resolution failed transiently; it is retried on the next lookup.
    Pending,
}

#[derive(Default)]
struct CacheState {
    resolved: HashMap<String, Arc<IssuerRecord>>,
    pending: HashMap<String, IssuerLoadParams>,
}

/// Concurrency-safe registry of issuer key material.
///
/// Construct one at startup and share it behind an `Arc`.
pub struct IssuerCache {
    resolver: IssuerResolver,
    state: Mutex<CacheState>,
}

impl IssuerCache {
    /// Creates an empty cache whose discovery traffic goes through `http_client`.
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            resolver: IssuerResolver::new(http_client),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Loads an issuer, resolving its keys immediately when possible.
    ///
    /// A discovery or JWKS failure does not fail the call: the request is
    /// parked as pending and `Ok(LoadOutcome::Pending)` is returned.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for an empty issuer URL, `AlreadyLoaded` when the
    /// issuer is already resolved, `IncompleteKeyConfiguration` when some
    /// algorithm has no inline key and discovery is disabled.
    #[instrument(skip(self, params), fields(issuer = %params.issuer_url), err)]
    pub async fn load_issuer(&self, params: IssuerLoadParams) -> Result<LoadOutcome, NilaJwtError> {
        if params.issuer_url.is_empty() {
            return Err(NilaJwtError::InvalidRequest("issuer_url is empty".to_string()));
        }

        let mut state = self.state.lock().await;
        if state.resolved.contains_key(&params.issuer_url) {
            return Err(NilaJwtError::AlreadyLoaded(params.issuer_url));
        }

        match self.reload_issuer(&params).await {
            Ok(record) => {
                info!(algorithms = ?record.keys_by_algorithm.keys().collect::<Vec<_>>(), "issuer loaded");
                state.pending.remove(&params.issuer_url);
                state
                    .resolved
                    .insert(params.issuer_url.clone(), Arc::new(record));
                Ok(LoadOutcome::Resolved)
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "issuer resolution failed, deferring until first use");
                state.pending.insert(params.issuer_url.clone(), params);
                Ok(LoadOutcome::Pending)
            }
            Err(e) => {
                error!(error = %e, "issuer configuration rejected");
                Err(e)
            }
        }
    }

    /// True iff the issuer has a resolved record. Pending issuers are not loaded.
    pub async fn issuer_is_loaded(&self, issuer_url: &str) -> bool {
        self.state.lock().await.resolved.contains_key(issuer_url)
    }

    /// True iff the issuer is waiting for a deferred resolution.
    pub async fn issuer_is_pending(&self, issuer_url: &str) -> bool {
        self.state.lock().await.pending.contains_key(issuer_url)
    }

    /// Returns the issuer's record, retrying a pending resolution once.
    ///
    /// # Errors
    ///
    /// `IssuerNotLoaded` with `pending: false` when the issuer was never
    /// loaded, `pending: true` when it is pending and the retry failed too.
    #[instrument(skip(self), err)]
    pub async fn get_issuer(&self, issuer_url: &str) -> Result<Arc<IssuerRecord>, NilaJwtError> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.resolved.get(issuer_url) {
            debug!("issuer cache hit");
            return Ok(Arc::clone(record));
        }

        let Some(params) = state.pending.get(issuer_url).cloned() else {
            return Err(NilaJwtError::IssuerNotLoaded {
                issuer: issuer_url.to_string(),
                pending: false,
            });
        };

        debug!("issuer is pending, retrying resolution");
        match self.reload_issuer(&params).await {
            Ok(record) => {
                let record = Arc::new(record);
                state.pending.remove(issuer_url);
                state
                    .resolved
                    .insert(issuer_url.to_string(), Arc::clone(&record));
                info!("pending issuer resolved");
                Ok(record)
            }
            Err(e) => {
                warn!(error = %e, "pending issuer still unresolvable");
                Err(NilaJwtError::IssuerNotLoaded {
                    issuer: issuer_url.to_string(),
                    pending: true,
                })
            }
        }
    }

    /// Builds a record from `params`. Caller holds the state lock.
    async fn reload_issuer(&self, params: &IssuerLoadParams) -> Result<IssuerRecord, NilaJwtError> {
        let mut keys_by_algorithm = HashMap::new();
        let mut algs_to_fetch = HashSet::new();
        for (alg, pem) in &params.alg_to_key_pem {
            if pem.is_empty() {
                algs_to_fetch.insert(alg.clone());
            } else {
                keys_by_algorithm.insert(alg.clone(), pem.clone());
            }
        }

        let mut discovery_document = String::new();
        if params.pulldown_discovery {
            let resolved = self.resolver.resolve(&params.issuer_url, &algs_to_fetch).await?;
            for (alg, pem) in resolved.keys_by_algorithm {
                keys_by_algorithm.entry(alg).or_insert(pem);
            }
            discovery_document = resolved.discovery_document;
        } else if !algs_to_fetch.is_empty() {
            let mut algorithms: Vec<String> = algs_to_fetch.into_iter().collect();
            algorithms.sort();
            return Err(NilaJwtError::IncompleteKeyConfiguration {
                issuer: params.issuer_url.clone(),
                algorithms,
            });
        }

        Ok(IssuerRecord {
            issuer_url: params.issuer_url.clone(),
            keys_by_algorithm,
            client_credential: params.client_credential.clone(),
            discovery_document,
        })
    }
}

/// Key-selection callback backed by the cache: looks the token's `iss` up
/// (retrying a pending issuer) and returns the PEM for its algorithm.
#[async_trait]
impl KeySelector for IssuerCache {
    async fn select_key(&self, token: &UnverifiedToken) -> Result<Vec<u8>, NilaJwtError> {
        let issuer = token
            .issuer()
            .ok_or_else(|| NilaJwtError::TokenInvalid("missing 'iss' claim".to_string()))?;
        let alg = token.algorithm();

        let record = self.get_issuer(issuer).await?;
        let pem = record.key_pem_for_alg(&alg)?;
        Ok(pem.as_bytes().to_vec())
    }
}
