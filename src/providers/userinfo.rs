//! Generic Profile Endpoint Adapter
//!
//! GETs a JSON profile endpoint with the access token and decodes the body
//! directly into the user type.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, OAuth2Error};
use crate::providers::{fetch_json, Identity, ProfileResponse, ProviderAdapter};
use crate::types::{TokenResponse, DEFAULT_TIMEOUT_MS};

/// Where the access token goes on the profile request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenPlacement {
    /// `Authorization: Bearer <token>`.
    BearerHeader,
    /// Query parameter with the given name (Slack uses `token`).
    Query(String),
}

/// Adapter for a JSON profile endpoint.
pub struct UserInfoAdapter<U, T> {
    name: String,
    endpoint: Url,
    placement: TokenPlacement,
    timeout: Duration,
    transport: Arc<T>,
    _user: PhantomData<fn() -> U>,
}

impl<U, T: HttpTransport> UserInfoAdapter<U, T> {
    pub fn new(
        name: impl Into<String>,
        endpoint: &str,
        transport: Arc<T>,
    ) -> Result<Self, OAuth2Error> {
        let endpoint = Url::parse(endpoint).map_err(|_| ConfigurationError::InvalidEndpoint {
            url: endpoint.to_string(),
        })?;
        Ok(Self {
            name: name.into(),
            endpoint,
            placement: TokenPlacement::BearerHeader,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            transport,
            _user: PhantomData,
        })
    }

    pub fn placement(mut self, placement: TokenPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Profile request for `token`.
    pub fn request(&self, token: &TokenResponse) -> HttpRequest {
        match &self.placement {
            TokenPlacement::BearerHeader => HttpRequest::get(self.endpoint.as_str())
                .header("authorization", token.authorization_header()),
            TokenPlacement::Query(param) => {
                let mut url = self.endpoint.clone();
                url.query_pairs_mut().append_pair(param, &token.access_token);
                HttpRequest::get(url.as_str())
            }
        }
        .timeout(self.timeout)
    }
}

#[async_trait]
impl<U, T> ProviderAdapter for UserInfoAdapter<U, T>
where
    U: DeserializeOwned + Identity + Clone + Send + Sync + 'static,
    T: HttpTransport + 'static,
{
    type User = U;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_user(&self, token: &TokenResponse) -> Result<ProfileResponse<U>, OAuth2Error> {
        fetch_json(self.transport.as_ref(), self.request(token)).await
    }
}
