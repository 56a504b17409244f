//! Configuration Types
//!
//! OAuth2 client registration and provider endpoint configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OAuth2 client configuration, read-only after startup.
#[derive(Clone)]
pub struct OAuth2Config {
    /// Provider configuration.
    pub provider: ProviderConfig,
    /// Client credentials.
    pub credentials: ClientCredentials,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Scopes to request.
    pub scopes: Vec<String>,
    /// Provider-specific authorization parameters appended to the login redirect.
    pub extra_auth_params: Vec<(String, String)>,
    /// HTTP timeout for provider calls.
    pub timeout: Duration,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            credentials: ClientCredentials::default(),
            redirect_uri: String::new(),
            scopes: Vec::new(),
            extra_auth_params: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl std::fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("provider", &self.provider)
            .field("credentials", &self.credentials)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("extra_auth_params", &self.extra_auth_params)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// OAuth2 provider endpoint configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// OIDC userinfo endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// JWKS URI for ID token validation (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// Client credentials for OAuth2 authentication.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret (for confidential clients).
    pub client_secret: Option<SecretString>,
    /// Client authentication method.
    pub auth_method: ClientAuthMethod,
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_method: ClientAuthMethod::ClientSecretBasic,
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Client authentication method at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// client_id and client_secret in request body.
    ClientSecretPost,
    /// HTTP Basic Authentication header.
    #[default]
    ClientSecretBasic,
    /// No client authentication (public client).
    None,
}

/// OIDC Discovery document (the fields this crate consumes).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OIDCDiscoveryDocument {
    /// Issuer identifier.
    pub issuer: String,
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Userinfo endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// JWKS URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    /// Supported scopes.
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    /// Supported response types.
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    /// ID token signing algorithms.
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl OIDCDiscoveryDocument {
    /// Convert to provider config.
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            userinfo_endpoint: self.userinfo_endpoint.clone(),
            jwks_uri: self.jwks_uri.clone(),
            issuer: Some(self.issuer.clone()),
        }
    }
}

/// Default provider call timeout. Several seconds, so a slow provider cannot
/// pin request concurrency.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = ClientCredentials {
            client_id: "client".to_string(),
            client_secret: Some(SecretString::new("hunter2".to_string())),
            auth_method: ClientAuthMethod::ClientSecretPost,
        };
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_provider_config_deserialize() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"authorization_endpoint":"https://example.com/authorize","token_endpoint":"https://example.com/token"}"#,
        )
        .unwrap();
        assert_eq!(config.token_endpoint, "https://example.com/token");
        assert!(config.userinfo_endpoint.is_none());
    }

    #[test]
    fn test_discovery_to_provider_config() {
        let doc = OIDCDiscoveryDocument {
            issuer: "https://example.com".to_string(),
            authorization_endpoint: "https://example.com/authorize".to_string(),
            token_endpoint: "https://example.com/token".to_string(),
            userinfo_endpoint: Some("https://example.com/userinfo".to_string()),
            jwks_uri: Some("https://example.com/.well-known/jwks.json".to_string()),
            scopes_supported: vec!["openid".to_string()],
            response_types_supported: vec!["code".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        };

        let config = doc.to_provider_config();
        assert_eq!(config.authorization_endpoint, "https://example.com/authorize");
        assert_eq!(config.issuer, Some("https://example.com".to_string()));
    }
}
