//! OpenID Connect ID Tokens
//!
//! Takes the user from the `id_token` returned with the access token instead
//! of calling a profile endpoint. The token signature is checked against the
//! issuer's JWKS; `iss`, `aud` and `exp` are validated.
//!
//! Azure Active Directory logins use this adapter with the tenant issuer,
//! e.g. [`AZURE_CONSUMERS_ISSUER`] resolved through
//! [`DefaultDiscoveryClient`](crate::core::DefaultDiscoveryClient).

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, OAuth2Error, ProtocolError};
use crate::providers::{fetch_json, Identity, ProfileResponse, ProviderAdapter};
use crate::types::{OAuth2Config, TokenResponse};

/// Microsoft personal accounts tenant.
pub const AZURE_CONSUMERS_ISSUER: &str =
    "https://login.microsoftonline.com/9188040d-6c67-4c5b-b112-36a304b66dad/v2.0";

/// Signature algorithms accepted by default. Symmetric algorithms are never
/// accepted for tokens verified against a public key set.
pub const DEFAULT_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(3600);

/// Standard ID token claims, plus the Azure tenant fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcUser {
    #[serde(rename = "sub")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub preferred_username: String,
    #[serde(rename = "tid")]
    pub tenant_id: String,
    #[serde(rename = "oid")]
    pub object_id: String,
}

impl Identity for OidcUser {
    fn identity(&self) -> &str {
        &self.id
    }
}

struct JwksCacheEntry {
    keys: Arc<JwkSet>,
    expires_at: Instant,
}

/// ID token adapter.
pub struct OidcAdapter<T, U = OidcUser> {
    name: String,
    issuer: String,
    client_id: String,
    jwks_uri: String,
    algorithms: Vec<Algorithm>,
    timeout: Duration,
    transport: Arc<T>,
    cache: Mutex<Option<JwksCacheEntry>>,
    cache_ttl: Duration,
    _user: PhantomData<fn() -> U>,
}

fn invalid_token(message: impl std::fmt::Display) -> OAuth2Error {
    ProtocolError::InvalidResponse {
        message: format!("id_token: {message}"),
    }
    .into()
}

fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}

impl<T: HttpTransport, U> OidcAdapter<T, U> {
    /// Adapter for the issuer and JWKS URI of `config`; the audience is the
    /// client id.
    pub fn new(config: &OAuth2Config, transport: Arc<T>) -> Result<Self, OAuth2Error> {
        let required = |value: &Option<String>, field: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigurationError::MissingRequired {
                    field: field.to_string(),
                })
        };
        Ok(Self {
            name: "oidc".to_string(),
            issuer: required(&config.provider.issuer, "issuer")?,
            client_id: config.credentials.client_id.clone(),
            jwks_uri: required(&config.provider.jwks_uri, "jwks_uri")?,
            algorithms: DEFAULT_ALGORITHMS.to_vec(),
            timeout: config.timeout,
            transport,
            cache: Mutex::new(None),
            cache_ttl: DEFAULT_JWKS_TTL,
            _user: PhantomData,
        })
    }

    /// Provider name reported in errors (e.g. `azure`).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn algorithms(mut self, algorithms: &[Algorithm]) -> Self {
        self.algorithms = algorithms.to_vec();
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn cached_keys(&self) -> Option<Arc<JwkSet>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.keys.clone())
    }

    async fn fetch_keys(&self) -> Result<Arc<JwkSet>, OAuth2Error> {
        tracing::debug!(url = %self.jwks_uri, "fetching JWKS");
        let request = HttpRequest::get(self.jwks_uri.as_str()).timeout(self.timeout);
        let response: ProfileResponse<JwkSet> = fetch_json(self.transport.as_ref(), request).await?;
        let keys = response.user.map(Arc::new).ok_or_else(|| {
            ConfigurationError::DiscoveryFailed {
                message: format!("JWKS request failed with status {}", response.status),
            }
        })?;

        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(JwksCacheEntry {
            keys: keys.clone(),
            expires_at: Instant::now() + self.cache_ttl,
        });
        Ok(keys)
    }

    /// Decoding key for `kid`, refetching the key set once when a cached set
    /// does not contain it (key rotation).
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, OAuth2Error> {
        let keys = match self.cached_keys() {
            Some(cached) if select_key(&cached, kid).is_some() => cached,
            _ => self.fetch_keys().await?,
        };
        let jwk = select_key(&keys, kid).ok_or_else(|| invalid_token("no matching key"))?;
        DecodingKey::from_jwk(jwk).map_err(invalid_token)
    }
}

impl<T: HttpTransport, U: DeserializeOwned> OidcAdapter<T, U> {
    /// Verify a raw ID token and decode its claims.
    pub async fn verify(&self, raw: &str) -> Result<U, OAuth2Error> {
        let header = decode_header(raw).map_err(invalid_token)?;
        if !self.algorithms.contains(&header.alg) {
            return Err(invalid_token(format!("algorithm {:?} not allowed", header.alg)));
        }

        let key = self.decoding_key(header.kid.as_deref()).await?;
        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.client_id]);
        validation.set_issuer(&[&self.issuer]);

        decode::<U>(raw, &key, &validation)
            .map(|data| data.claims)
            .map_err(invalid_token)
    }
}

#[async_trait]
impl<T, U> ProviderAdapter for OidcAdapter<T, U>
where
    T: HttpTransport + 'static,
    U: DeserializeOwned + Identity + Clone + Send + Sync + 'static,
{
    type User = U;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_user(&self, token: &TokenResponse) -> Result<ProfileResponse<U>, OAuth2Error> {
        let raw = token
            .id_token
            .as_deref()
            .or_else(|| token.extra("id_token").and_then(|v| v.as_str()))
            .ok_or_else(|| ProtocolError::MissingField {
                field: "id_token".to_string(),
            })?;
        Ok(ProfileResponse::ok(self.verify(raw).await?))
    }
}
