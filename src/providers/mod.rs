//! Provider Adapters
//!
//! Turn the token published by the callback stage into a provider user.
//!
//! A [`ProviderAdapter`] fetches the profile; [`ProviderLayer`] runs it after
//! the callback stage, validates the result and publishes the user for the
//! success handler.
//!
//! Presets:
//! - [`amazon::AmazonAdapter`]
//! - [`bitbucket::BitbucketAdapter`]
//! - [`linkedin::LinkedInAdapter`]
//! - [`slack::SlackAdapter`]
//! - [`oidc::OidcAdapter`] (ID token verification, `jwt` feature)
//!
//! [`userinfo::UserInfoAdapter`] covers any provider with a JSON profile endpoint.

pub mod amazon;
pub mod bitbucket;
pub mod linkedin;
#[cfg(feature = "jwt")]
pub mod oidc;
pub mod slack;
pub mod userinfo;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;

use crate::context;
use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::{OAuth2Error, ProtocolError, ProviderUserError};
use crate::middleware::{respond_with_failure, BoxFuture, DefaultFailureHandler};
use crate::telemetry::{HandshakeMetrics, NoOpMetrics, OAuth2SpanNames, OAuth2Stages};
use crate::types::TokenResponse;

/// Stable provider-side identifier of a user.
pub trait Identity {
    fn identity(&self) -> &str;
}

/// Raw outcome of a profile fetch, before validation.
#[derive(Clone, Debug)]
pub struct ProfileResponse<U> {
    /// HTTP status of the profile endpoint.
    pub status: u16,
    /// Decoded user, if the body could be read.
    pub user: Option<U>,
}

impl<U> ProfileResponse<U> {
    pub fn ok(user: U) -> Self {
        Self {
            status: 200,
            user: Some(user),
        }
    }

    pub fn status(status: u16) -> Self {
        Self { status, user: None }
    }
}

/// Fetches the user for an access token.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// User type published to the request scope.
    type User: Identity + Clone + Send + Sync + 'static;

    /// Provider name used in errors, logs and metrics.
    fn name(&self) -> &str;

    /// Fetch the profile. `Err` means no profile could be obtained at all.
    async fn fetch_user(
        &self,
        token: &TokenResponse,
    ) -> Result<ProfileResponse<Self::User>, OAuth2Error>;
}

/// Accept a fetched profile only if the call succeeded with status 200 and the
/// user carries a non-empty identity.
pub fn validate_response<U: Identity>(
    provider: &str,
    fetched: Result<ProfileResponse<U>, OAuth2Error>,
) -> Result<U, OAuth2Error> {
    let reason = match fetched {
        Err(e) => e.to_string(),
        Ok(response) if response.status != 200 => format!("status {}", response.status),
        Ok(ProfileResponse { user: None, .. }) => "empty profile".to_string(),
        Ok(ProfileResponse { user: Some(user), .. }) => {
            if !user.identity().is_empty() {
                return Ok(user);
            }
            "empty identity".to_string()
        }
    };
    Err(ProviderUserError::new(provider, reason).into())
}

/// Send `request` and decode a JSON body on status 200. Other statuses yield
/// no user.
pub(crate) async fn fetch_json<T, V>(
    transport: &T,
    request: HttpRequest,
) -> Result<ProfileResponse<V>, OAuth2Error>
where
    T: HttpTransport + ?Sized,
    V: DeserializeOwned,
{
    let response = transport
        .send(request.header("accept", "application/json"))
        .await?;
    if response.status != 200 {
        return Ok(ProfileResponse::status(response.status));
    }
    let value = serde_json::from_str(&response.body).map_err(|e| ProtocolError::InvalidJson {
        message: e.to_string(),
    })?;
    Ok(ProfileResponse {
        status: response.status,
        user: Some(value),
    })
}

/// Layer running a [`ProviderAdapter`] after the callback stage.
pub struct ProviderLayer<P, F = DefaultFailureHandler> {
    adapter: Arc<P>,
    failure: F,
    metrics: Arc<dyn HandshakeMetrics>,
}

impl<P, F: Clone> Clone for ProviderLayer<P, F> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            failure: self.failure.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P: ProviderAdapter> ProviderLayer<P> {
    pub fn new(adapter: P) -> Self {
        Self::from_arc(Arc::new(adapter))
    }

    pub fn from_arc(adapter: Arc<P>) -> Self {
        Self {
            adapter,
            failure: DefaultFailureHandler,
            metrics: Arc::new(NoOpMetrics),
        }
    }
}

impl<P, F> ProviderLayer<P, F> {
    /// Set the service run when no user can be obtained.
    pub fn failure_handler<G>(self, failure: G) -> ProviderLayer<P, G> {
        ProviderLayer {
            adapter: self.adapter,
            failure,
            metrics: self.metrics,
        }
    }

    /// Set metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn HandshakeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl<P, S, F: Clone> Layer<S> for ProviderLayer<P, F> {
    type Service = ProviderService<P, S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        ProviderService {
            inner,
            adapter: self.adapter.clone(),
            failure: self.failure.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Provider stage service.
pub struct ProviderService<P, S, F = DefaultFailureHandler> {
    inner: S,
    adapter: Arc<P>,
    failure: F,
    metrics: Arc<dyn HandshakeMetrics>,
}

impl<P, S: Clone, F: Clone> Clone for ProviderService<P, S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            adapter: self.adapter.clone(),
            failure: self.failure.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P, S, F> Service<Request> for ProviderService<P, S, F>
where
    P: ProviderAdapter,
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    F: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    F::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let adapter = self.adapter.clone();
        let failure = self.failure.clone();
        let metrics = self.metrics.clone();

        let span = tracing::info_span!(OAuth2SpanNames::USER_FETCH, provider = adapter.name());

        Box::pin(
            async move {
                let token = match context::token_from(req.extensions()) {
                    Ok(token) => token.clone(),
                    Err(error) => {
                        return Ok(respond_with_failure(
                            failure,
                            req,
                            error,
                            OAuth2Stages::PROVIDER,
                            &metrics,
                        )
                        .await)
                    }
                };

                let started = Instant::now();
                let fetched = adapter.fetch_user(&token).await;
                let user = validate_response(adapter.name(), fetched);
                metrics.record_user_fetch(adapter.name(), started.elapsed(), user.is_ok());

                match user {
                    Ok(user) => {
                        tracing::debug!(provider = adapter.name(), "provider user fetched");
                        context::with_user(req.extensions_mut(), user);
                        inner.call(req).await
                    }
                    Err(error) => Ok(respond_with_failure(
                        failure,
                        req,
                        error,
                        OAuth2Stages::PROVIDER,
                        &metrics,
                    )
                    .await),
                }
            }
            .instrument(span),
        )
    }
}
