//! Login Stage
//!
//! Redirects the browser to the provider's authorization endpoint with the
//! published state embedded. Never contacts the provider itself.

use axum::extract::Request;
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::Instrument;

use crate::context;
use crate::core::state::redact;
use crate::flows::AuthorizationCodeFlow;
use crate::middleware::failure::{respond_with_failure, DefaultFailureHandler};
use crate::middleware::BoxFuture;
use crate::telemetry::{HandshakeMetrics, NoOpMetrics, OAuth2SpanNames, OAuth2Stages};

/// Login stage service. Wrap it in a [`CsrfLayer`](crate::middleware::CsrfLayer).
#[derive(Clone)]
pub struct LoginService<F = DefaultFailureHandler> {
    flow: Arc<dyn AuthorizationCodeFlow>,
    failure: F,
    metrics: Arc<dyn HandshakeMetrics>,
}

impl LoginService {
    /// Create login service using the default failure handler.
    pub fn new(flow: Arc<dyn AuthorizationCodeFlow>) -> Self {
        Self {
            flow,
            failure: DefaultFailureHandler,
            metrics: Arc::new(NoOpMetrics),
        }
    }
}

impl<F> LoginService<F> {
    /// Set the service run when no state was published.
    pub fn failure_handler<G>(self, failure: G) -> LoginService<G> {
        LoginService {
            flow: self.flow,
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

impl<F> Service<Request> for LoginService<F>
where
    F: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    F::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let flow = self.flow.clone();
        let failure = self.failure.clone();
        let metrics = self.metrics.clone();

        let span = tracing::debug_span!(OAuth2SpanNames::LOGIN);

        Box::pin(
            async move {
                let redirect = context::state_from(req.extensions()).and_then(|state| {
                    flow.authorization_url(state)
                        .map(|url| (url, redact(state)))
                });

                match redirect {
                    Ok((url, state)) => {
                        tracing::debug!(
                            state = %state,
                            host = url.host_str().unwrap_or(""),
                            "redirecting to provider"
                        );
                        metrics.record_login_redirect();
                        Ok((StatusCode::FOUND, [(LOCATION, url.to_string())]).into_response())
                    }
                    Err(error) => Ok(respond_with_failure(
                        failure,
                        req,
                        error,
                        OAuth2Stages::LOGIN,
                        &metrics,
                    )
                    .await),
                }
            }
            .instrument(span),
        )
    }
}
