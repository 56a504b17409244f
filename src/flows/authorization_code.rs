//! Authorization Code Flow
//!
//! RFC 6749 Section 4.1 - Authorization Code Grant: the provider redirect URL
//! and the code-for-token exchange.

use async_trait::async_trait;
use base64::Engine;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use url::{form_urlencoded, Url};

use crate::core::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{
    create_error_from_response, map_token_error, ConfigurationError, OAuth2Error,
    OAuth2ErrorResponse, ProtocolError, TokenExchangeError,
};
use crate::telemetry::OAuth2SpanNames;
use crate::types::{ClientAuthMethod, OAuth2Config, TokenResponse};

/// Authorization Code Flow interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationCodeFlow: Send + Sync {
    /// Build the provider authorization URL carrying `state`.
    fn authorization_url(&self, state: &str) -> Result<Url, OAuth2Error>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuth2Error>;
}

/// Authorization Code Flow implementation.
pub struct AuthorizationCodeFlowImpl<T: HttpTransport> {
    config: Arc<OAuth2Config>,
    transport: Arc<T>,
}

impl<T: HttpTransport> AuthorizationCodeFlowImpl<T> {
    /// Create new Authorization Code Flow.
    pub fn new(config: Arc<OAuth2Config>, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    /// Shared configuration.
    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    fn build_token_request(&self, code: &str) -> HttpRequest {
        let credentials = &self.config.credentials;

        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("client_id", &credentials.client_id);

        if credentials.auth_method == ClientAuthMethod::ClientSecretPost {
            if let Some(secret) = &credentials.client_secret {
                form.append_pair("client_secret", secret.expose_secret());
            }
        }

        let mut request = HttpRequest::post_form(&self.config.provider.token_endpoint, form.finish())
            .header("accept", "application/json")
            .timeout(self.config.timeout);

        if credentials.auth_method == ClientAuthMethod::ClientSecretBasic {
            if let Some(secret) = &credentials.client_secret {
                // RFC 6749 Section 2.3.1: form-encode before base64.
                let user: String =
                    form_urlencoded::byte_serialize(credentials.client_id.as_bytes()).collect();
                let pass: String =
                    form_urlencoded::byte_serialize(secret.expose_secret().as_bytes()).collect();
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
                request = request.header("authorization", format!("Basic {encoded}"));
            }
        }

        request
    }
}

/// Decode a 2xx token endpoint body.
///
/// JSON is expected; `application/x-www-form-urlencoded` bodies are also
/// accepted since some providers ignore `Accept`. An `error` member in a 2xx
/// body is still a failure.
pub fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse, OAuth2Error> {
    let value = if response.content_type() == Some("application/x-www-form-urlencoded") {
        let object = form_urlencoded::parse(response.body.as_bytes())
            .map(|(key, value)| {
                let value = match (key.as_ref(), value.parse::<u64>()) {
                    ("expires_in", Ok(secs)) => serde_json::Value::from(secs),
                    _ => serde_json::Value::from(value.into_owned()),
                };
                (key.into_owned(), value)
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    } else {
        serde_json::from_str(&response.body).map_err(|e| ProtocolError::InvalidJson {
            message: e.to_string(),
        })?
    };

    if value.get("access_token").is_none() && value.get("error").is_some() {
        let error: OAuth2ErrorResponse =
            serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJson {
                message: e.to_string(),
            })?;
        return Err(TokenExchangeError::Provider(map_token_error(&error)).into());
    }

    let token: TokenResponse =
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJson {
            message: e.to_string(),
        })?;

    if token.access_token.is_empty() {
        return Err(ProtocolError::MissingField {
            field: "access_token".to_string(),
        }
        .into());
    }

    Ok(token)
}

#[async_trait]
impl<T: HttpTransport> AuthorizationCodeFlow for AuthorizationCodeFlowImpl<T> {
    fn authorization_url(&self, state: &str) -> Result<Url, OAuth2Error> {
        let endpoint = &self.config.provider.authorization_endpoint;
        let mut url = Url::parse(endpoint).map_err(|_| ConfigurationError::InvalidEndpoint {
            url: endpoint.clone(),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.credentials.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri);
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            query.append_pair("state", state);
            for (key, value) in &self.config.extra_auth_params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuth2Error> {
        let span = tracing::info_span!(
            OAuth2SpanNames::TOKEN_EXCHANGE,
            token_endpoint = %self.config.provider.token_endpoint,
            status = tracing::field::Empty,
        );

        async {
            let started = Instant::now();
            let request = self.build_token_request(code);

            let response = self
                .transport
                .send(request)
                .await
                .map_err(OAuth2Error::into_token_exchange)?;
            tracing::Span::current().record("status", response.status);

            if !response.is_success() {
                tracing::warn!(status = response.status, "token endpoint rejected code");
                return Err(create_error_from_response(response.status, &response.body));
            }

            let token = parse_token_response(&response).map_err(OAuth2Error::into_token_exchange)?;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::debug!(elapsed_ms, "token exchange complete");
            Ok(token)
        }
        .instrument(span)
        .await
    }
}
