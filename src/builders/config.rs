//! Configuration Builder
//!
//! Fluent builder for OAuth2 login configuration.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::{ConfigurationError, OAuth2Error};
use crate::types::{
    ClientAuthMethod, ClientCredentials, OAuth2Config, ProviderConfig, DEFAULT_TIMEOUT_MS,
};

/// OAuth2 login configuration builder.
#[derive(Default)]
pub struct OAuth2ConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    auth_method: Option<ClientAuthMethod>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    jwks_uri: Option<String>,
    issuer: Option<String>,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
    extra_auth_params: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl OAuth2ConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set client authentication method.
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    /// Set authorization endpoint.
    pub fn authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(endpoint.into());
        self
    }

    /// Set token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set userinfo endpoint.
    pub fn userinfo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    /// Set JWKS URI.
    pub fn jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(uri.into());
        self
    }

    /// Set issuer.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the redirect URI registered with the provider.
    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Set scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Add a scope.
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Add a provider-specific authorization parameter (e.g. `prompt`, `access_type`).
    pub fn extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_auth_params.push((key.into(), value.into()));
        self
    }

    /// Set provider call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Configure from provider config (e.g., from discovery).
    pub fn from_provider_config(mut self, provider: ProviderConfig) -> Self {
        self.authorization_endpoint = Some(provider.authorization_endpoint);
        self.token_endpoint = Some(provider.token_endpoint);
        self.userinfo_endpoint = provider.userinfo_endpoint;
        self.jwks_uri = provider.jwks_uri;
        self.issuer = provider.issuer;
        self
    }

    /// Build the OAuth2 configuration.
    pub fn build(self) -> Result<OAuth2Config, OAuth2Error> {
        let client_id = required(self.client_id, "client_id")?;
        let authorization_endpoint =
            required(self.authorization_endpoint, "authorization_endpoint")?;
        let token_endpoint = required(self.token_endpoint, "token_endpoint")?;
        let redirect_uri = required(self.redirect_uri, "redirect_uri")?;

        for endpoint in [&authorization_endpoint, &token_endpoint, &redirect_uri]
            .into_iter()
            .chain(self.userinfo_endpoint.as_ref())
            .chain(self.jwks_uri.as_ref())
        {
            validate_endpoint(endpoint)?;
        }

        let auth_method = self.auth_method.unwrap_or_default();

        if matches!(
            auth_method,
            ClientAuthMethod::ClientSecretBasic | ClientAuthMethod::ClientSecretPost
        ) && self.client_secret.is_none()
        {
            return Err(ConfigurationError::MissingRequired {
                field: "client_secret".to_string(),
            }
            .into());
        }

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS));
        if timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "timeout must be non-zero".to_string(),
            }
            .into());
        }

        Ok(OAuth2Config {
            credentials: ClientCredentials {
                client_id,
                client_secret: self.client_secret,
                auth_method,
            },
            provider: ProviderConfig {
                authorization_endpoint,
                token_endpoint,
                userinfo_endpoint: self.userinfo_endpoint,
                jwks_uri: self.jwks_uri,
                issuer: self.issuer,
            },
            redirect_uri,
            scopes: self.scopes,
            extra_auth_params: self.extra_auth_params,
            timeout,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, OAuth2Error> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        ConfigurationError::MissingRequired {
            field: field.to_string(),
        }
        .into()
    })
}

fn validate_endpoint(endpoint: &str) -> Result<(), OAuth2Error> {
    match Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigurationError::InvalidEndpoint {
            url: endpoint.to_string(),
        }
        .into()),
    }
}

/// Create a new OAuth2 configuration builder.
pub fn oauth2_config() -> OAuth2ConfigBuilder {
    OAuth2ConfigBuilder::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn base() -> OAuth2ConfigBuilder {
        OAuth2ConfigBuilder::new()
            .client_id("test-client")
            .client_secret("test-secret")
            .authorization_endpoint("https://example.com/authorize")
            .token_endpoint("https://example.com/token")
            .redirect_uri("https://app.example.com/callback")
    }

    #[test]
    fn test_builder_success() {
        let config = base()
            .add_scope("openid")
            .add_scope("profile")
            .extra_param("prompt", "consent")
            .build()
            .unwrap();

        assert_eq!(config.credentials.client_id, "test-client");
        assert_eq!(
            config.provider.authorization_endpoint,
            "https://example.com/authorize"
        );
        assert_eq!(config.scopes, vec!["openid", "profile"]);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.extra_auth_params,
            vec![("prompt".to_string(), "consent".to_string())]
        );
    }

    #[test]
    fn test_builder_missing_client_id() {
        let result = OAuth2ConfigBuilder::new()
            .client_secret("test-secret")
            .authorization_endpoint("https://example.com/authorize")
            .token_endpoint("https://example.com/token")
            .redirect_uri("https://app.example.com/callback")
            .build();

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_missing_secret_with_basic_auth() {
        let result = base()
            .auth_method(ClientAuthMethod::ClientSecretBasic)
            .build();
        assert!(result.is_ok());

        let result = OAuth2ConfigBuilder::new()
            .client_id("test-client")
            .auth_method(ClientAuthMethod::ClientSecretBasic)
            .authorization_endpoint("https://example.com/authorize")
            .token_endpoint("https://example.com/token")
            .redirect_uri("https://app.example.com/callback")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_no_secret_required_for_none_auth() {
        let config = OAuth2ConfigBuilder::new()
            .client_id("test-client")
            .auth_method(ClientAuthMethod::None)
            .authorization_endpoint("https://example.com/authorize")
            .token_endpoint("https://example.com/token")
            .redirect_uri("http://localhost:8080/callback")
            .build()
            .unwrap();

        assert!(config.credentials.client_secret.is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_endpoint() {
        let result = base().token_endpoint("not a url").build();
        assert!(matches!(
            result,
            Err(OAuth2Error::Configuration(ConfigurationError::InvalidEndpoint { .. }))
        ));

        let result = base().userinfo_endpoint("ftp://example.com/userinfo").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        assert!(base().timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_builder_from_provider_config() {
        let provider = ProviderConfig {
            authorization_endpoint: "https://example.com/authorize".to_string(),
            token_endpoint: "https://example.com/token".to_string(),
            userinfo_endpoint: Some("https://example.com/userinfo".to_string()),
            jwks_uri: Some("https://example.com/.well-known/jwks.json".to_string()),
            issuer: Some("https://example.com".to_string()),
        };

        let config = oauth2_config()
            .client_id("test-client")
            .client_secret("test-secret")
            .redirect_uri("https://app.example.com/callback")
            .from_provider_config(provider)
            .build()
            .unwrap();

        assert_eq!(config.provider.issuer, Some("https://example.com".to_string()));
        assert!(config.provider.userinfo_endpoint.is_some());
    }
}
