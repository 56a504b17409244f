//! OIDC Discovery
//!
//! Populates provider endpoints from an issuer's
//! `/.well-known/openid-configuration` document.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, OAuth2Error, ProtocolError};
use crate::types::{OIDCDiscoveryDocument, ProviderConfig};

/// Discovery cache entry.
struct DiscoveryCacheEntry {
    document: OIDCDiscoveryDocument,
    expires_at: Instant,
}

/// Discovery client interface (for dependency injection).
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Fetch discovery document for issuer.
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OAuth2Error>;

    /// Get provider config from discovery.
    async fn get_provider_config(&self, issuer: &str) -> Result<ProviderConfig, OAuth2Error> {
        Ok(self.fetch(issuer).await?.to_provider_config())
    }

    /// Clear cache for issuer, or all issuers.
    fn clear_cache(&self, issuer: Option<&str>);
}

/// Default discovery client with an in-memory TTL cache.
pub struct DefaultDiscoveryClient<T: HttpTransport> {
    transport: Arc<T>,
    cache: Mutex<HashMap<String, DiscoveryCacheEntry>>,
    cache_ttl: Duration,
}

impl<T: HttpTransport> DefaultDiscoveryClient<T> {
    /// Create new discovery client (one hour cache).
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_cache_ttl(transport, Duration::from_secs(3600))
    }

    /// Create discovery client with custom cache TTL.
    pub fn with_cache_ttl(transport: Arc<T>, cache_ttl: Duration) -> Self {
        Self {
            transport,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
        }
    }

    fn normalize_issuer(issuer: &str) -> String {
        issuer.trim_end_matches('/').to_string()
    }

    fn get_from_cache(&self, key: &str) -> Option<OIDCDiscoveryDocument> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = cache.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.document.clone());
            }
            cache.remove(key);
        }

        None
    }

    fn set_cache(&self, key: String, document: OIDCDiscoveryDocument) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                DiscoveryCacheEntry {
                    document,
                    expires_at: Instant::now() + self.cache_ttl,
                },
            );
    }
}

fn discovery_failed(message: impl Into<String>) -> OAuth2Error {
    ConfigurationError::DiscoveryFailed {
        message: message.into(),
    }
    .into()
}

#[async_trait]
impl<T: HttpTransport> DiscoveryClient for DefaultDiscoveryClient<T> {
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OAuth2Error> {
        let normalized_issuer = Self::normalize_issuer(issuer);
        if let Some(cached) = self.get_from_cache(&normalized_issuer) {
            return Ok(cached);
        }

        let discovery_url = format!("{}/.well-known/openid-configuration", normalized_issuer);
        tracing::debug!(url = %discovery_url, "fetching OIDC discovery document");

        let response = self
            .transport
            .send(HttpRequest::get(discovery_url).header("accept", "application/json"))
            .await?;

        if response.status != 200 {
            return Err(discovery_failed(format!(
                "Discovery request failed with status {}",
                response.status
            )));
        }

        let document: OIDCDiscoveryDocument =
            serde_json::from_str(&response.body).map_err(|e| ProtocolError::InvalidJson {
                message: e.to_string(),
            })?;

        if document.authorization_endpoint.is_empty() || document.token_endpoint.is_empty() {
            return Err(discovery_failed(
                "Discovery document missing required endpoints",
            ));
        }

        let response_issuer = Self::normalize_issuer(&document.issuer);
        if response_issuer != normalized_issuer {
            return Err(discovery_failed(format!(
                "Issuer mismatch: expected {}, got {}",
                normalized_issuer, response_issuer
            )));
        }

        self.set_cache(normalized_issuer, document.clone());

        Ok(document)
    }

    fn clear_cache(&self, issuer: Option<&str>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match issuer {
            Some(i) => {
                cache.remove(&Self::normalize_issuer(i));
            }
            None => cache.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockHttpTransport;
    use serde_json::json;

    fn document(issuer: &str) -> serde_json::Value {
        json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/authorize"),
            "token_endpoint": format!("{issuer}/token"),
            "userinfo_endpoint": format!("{issuer}/userinfo"),
            "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
            "response_types_supported": ["code"]
        })
    }

    #[tokio::test]
    async fn test_fetch_and_cache() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &document("https://login.example.com"));
        let client = DefaultDiscoveryClient::new(transport.clone());

        let config = client
            .get_provider_config("https://login.example.com/")
            .await
            .unwrap();
        assert_eq!(config.token_endpoint, "https://login.example.com/token");
        assert_eq!(config.issuer.as_deref(), Some("https://login.example.com"));

        // Served from cache; the mock queue is now empty.
        client.fetch("https://login.example.com").await.unwrap();
        assert_eq!(transport.get_requests().len(), 1);
        assert_eq!(
            transport.get_requests()[0].url,
            "https://login.example.com/.well-known/openid-configuration"
        );

        client.clear_cache(None);
        assert!(client.fetch("https://login.example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_issuer_mismatch_is_rejected() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &document("https://other.example.com"));
        let client = DefaultDiscoveryClient::new(transport);

        let err = client.fetch("https://login.example.com").await.unwrap_err();
        assert!(matches!(
            err,
            OAuth2Error::Configuration(ConfigurationError::DiscoveryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_200_is_rejected() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(404, &json!({}));
        let client = DefaultDiscoveryClient::new(transport);

        assert!(client.fetch("https://login.example.com").await.is_err());
    }
}
