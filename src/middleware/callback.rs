//! Callback Stage
//!
//! Validates the provider's redirect against the published correlation state,
//! exchanges the authorization code and publishes the token.
//!
//! Steps run in order and stop at the first failure:
//!
//! 1. parse `code` and `state` (form body first, then query string)
//! 2. read the correlation state from the request scope
//! 3. compare both in constant time
//! 4. exchange the code at the token endpoint
//! 5. publish the token and call the inner service

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::Response;
use constant_time_eq::constant_time_eq;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;
use url::form_urlencoded;

use crate::context;
use crate::core::state::{redact, ReplayGuard};
use crate::error::{CallbackError, OAuth2Error};
use crate::flows::AuthorizationCodeFlow;
use crate::middleware::failure::{respond_with_failure, DefaultFailureHandler};
use crate::middleware::BoxFuture;
use crate::telemetry::{HandshakeMetrics, NoOpMetrics, OAuth2SpanNames, OAuth2Stages};
use crate::types::CallbackParams;

/// Largest accepted form-encoded callback body.
pub const MAX_CALLBACK_FORM_BYTES: usize = 16 * 1024;

/// Layer for the callback stage.
#[derive(Clone)]
pub struct CallbackLayer<F = DefaultFailureHandler> {
    flow: Arc<dyn AuthorizationCodeFlow>,
    failure: F,
    replay_guard: Option<Arc<dyn ReplayGuard>>,
    metrics: Arc<dyn HandshakeMetrics>,
}

impl CallbackLayer {
    /// Create callback layer using the default failure handler.
    pub fn new(flow: Arc<dyn AuthorizationCodeFlow>) -> Self {
        Self {
            flow,
            failure: DefaultFailureHandler,
            replay_guard: None,
            metrics: Arc::new(NoOpMetrics),
        }
    }
}

impl<F> CallbackLayer<F> {
    /// Set the service run on any callback failure.
    pub fn failure_handler<G>(self, failure: G) -> CallbackLayer<G> {
        CallbackLayer {
            flow: self.flow,
            failure,
            replay_guard: self.replay_guard,
            metrics: self.metrics,
        }
    }

    /// Reject state values already presented on an earlier validated callback.
    pub fn replay_guard(mut self, guard: Arc<dyn ReplayGuard>) -> Self {
        self.replay_guard = Some(guard);
        self
    }

    /// Set metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn HandshakeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl<S, F: Clone> Layer<S> for CallbackLayer<F> {
    type Service = CallbackService<S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        CallbackService {
            inner,
            flow: self.flow.clone(),
            failure: self.failure.clone(),
            replay_guard: self.replay_guard.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Callback stage service.
#[derive(Clone)]
pub struct CallbackService<S, F = DefaultFailureHandler> {
    inner: S,
    flow: Arc<dyn AuthorizationCodeFlow>,
    failure: F,
    replay_guard: Option<Arc<dyn ReplayGuard>>,
    metrics: Arc<dyn HandshakeMetrics>,
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Collect callback parameters. A consumed form body is put back so the
/// inner service can still read it.
async fn read_params(req: Request) -> (Request, Result<CallbackParams, OAuth2Error>) {
    let query = CallbackParams::from_query(req.uri().query().unwrap_or(""));
    if req.method() != Method::POST || !is_form(req.headers()) {
        return (req, Ok(query));
    }

    let (parts, body) = req.into_parts();
    match to_bytes(body, MAX_CALLBACK_FORM_BYTES).await {
        Ok(bytes) => {
            let form = CallbackParams::from_pairs(form_urlencoded::parse(&bytes).into_owned());
            (Request::from_parts(parts, Body::from(bytes)), Ok(form.or(query)))
        }
        Err(e) => (
            Request::from_parts(parts, Body::empty()),
            Err(CallbackError::Malformed {
                message: format!("unreadable form body: {e}"),
            }
            .into()),
        ),
    }
}

/// Steps 1-3: returns the authorization code once the state checks out.
fn validate(
    req: &Request,
    params: Result<CallbackParams, OAuth2Error>,
    replay_guard: Option<&dyn ReplayGuard>,
) -> Result<String, OAuth2Error> {
    let (code, state) = params?.into_validated()?;
    let expected = context::state_from(req.extensions())?;

    if expected.is_empty() || !constant_time_eq(state.as_bytes(), expected.as_bytes()) {
        tracing::warn!(expected = %redact(expected), "callback state mismatch");
        return Err(CallbackError::InvalidState.into());
    }

    if let Some(guard) = replay_guard {
        if !guard.consume(&state) {
            tracing::warn!(state = %redact(&state), "callback state replayed");
            return Err(CallbackError::InvalidState.into());
        }
    }

    Ok(code)
}

impl<S, F> Service<Request> for CallbackService<S, F>
where
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

    fn call(&mut self, req: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let flow = self.flow.clone();
        let failure = self.failure.clone();
        let replay_guard = self.replay_guard.clone();
        let metrics = self.metrics.clone();

        let span = tracing::info_span!(OAuth2SpanNames::CALLBACK, method = %req.method());

        Box::pin(
            async move {
                let (mut req, params) = read_params(req).await;

                let code = match validate(&req, params, replay_guard.as_deref()) {
                    Ok(code) => code,
                    Err(error) => {
                        return Ok(respond_with_failure(
                            failure,
                            req,
                            error,
                            OAuth2Stages::CALLBACK,
                            &metrics,
                        )
                        .await)
                    }
                };

                let started = Instant::now();
                let exchanged = flow.exchange_code(&code).await;
                metrics.record_token_exchange(started.elapsed(), exchanged.is_ok());

                match exchanged {
                    Ok(token) => {
                        metrics.record_callback_success();
                        context::with_token(req.extensions_mut(), token);
                        inner.call(req).await
                    }
                    Err(error) => Ok(respond_with_failure(
                        failure,
                        req,
                        error,
                        OAuth2Stages::CALLBACK,
                        &metrics,
                    )
                    .await),
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LoginError, OAuth2Token};
    use crate::core::InMemoryReplayGuard;
    use crate::error::{ErrorKind, NetworkError};
    use crate::flows::MockAuthorizationCodeFlow;
    use crate::telemetry::InMemoryMetrics;
    use crate::types::TokenResponse;
    use axum::Router;
    use http::StatusCode;
    use std::time::Duration;
    use tower::ServiceExt;

    fn success() -> Router {
        Router::new().fallback(|OAuth2Token(token): OAuth2Token, body: String| async move {
            format!("{}|{}", token.access_token, body)
        })
    }

    fn failure() -> Router {
        Router::new().fallback(|LoginError(error): LoginError| async move {
            let kind = error.map(|e| e.kind().to_string()).unwrap_or_default();
            (StatusCode::UNAUTHORIZED, kind)
        })
    }

    fn flow_returning_token(times: usize) -> Arc<dyn AuthorizationCodeFlow> {
        let mut flow = MockAuthorizationCodeFlow::new();
        flow.expect_exchange_code()
            .times(times)
            .returning(|code| Ok(TokenResponse::bearer(format!("token-for-{code}"))));
        Arc::new(flow)
    }

    fn service(flow: Arc<dyn AuthorizationCodeFlow>) -> CallbackService<Router, Router> {
        CallbackLayer::new(flow)
            .failure_handler(failure())
            .layer(success())
    }

    fn get(uri: &str, state: Option<&str>) -> Request {
        let mut req = http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        if let Some(state) = state {
            context::with_state(req.extensions_mut(), state);
        }
        req
    }

    async fn run(service: CallbackService<Router, Router>, req: Request) -> (StatusCode, String) {
        let response = service.oneshot(req).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_valid_callback_publishes_token() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let service = CallbackLayer::new(flow_returning_token(1))
            .failure_handler(failure())
            .metrics(metrics.clone())
            .layer(success());

        let (status, body) = run(service, get("/callback?code=abc&state=S1", Some("S1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "token-for-abc|");
        assert_eq!(metrics.count("oauth2_callbacks_total"), 1);
        assert_eq!(metrics.count("oauth2_token_exchange_duration_ms"), 1);
    }

    #[tokio::test]
    async fn test_state_mismatch_never_exchanges() {
        let (status, body) = run(
            service(flow_returning_token(0)),
            get("/callback?code=abc&state=X", Some("Y")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, ErrorKind::InvalidState.as_str());
    }

    #[tokio::test]
    async fn test_empty_expected_state_is_invalid() {
        let (_, body) = run(
            service(flow_returning_token(0)),
            get("/callback?code=abc&state=X", Some("")),
        )
        .await;
        assert_eq!(body, "invalid_state");
    }

    #[tokio::test]
    async fn test_state_prefix_or_extension_is_invalid() {
        for (sent, expected) in [("S1", "S1-long"), ("S1-long", "S1"), ("S2", "S1")] {
            let (_, body) = run(
                service(flow_returning_token(0)),
                get(&format!("/callback?code=abc&state={sent}"), Some(expected)),
            )
            .await;
            assert_eq!(body, "invalid_state", "sent {sent}, expected {expected}");
        }
    }

    #[tokio::test]
    async fn test_missing_scope_state() {
        let (_, body) = run(
            service(flow_returning_token(0)),
            get("/callback?code=abc&state=X", None),
        )
        .await;
        assert_eq!(body, "missing_state");
    }

    #[tokio::test]
    async fn test_malformed_and_denied_callbacks() {
        let (_, body) = run(
            service(flow_returning_token(0)),
            get("/callback?state=S1", Some("S1")),
        )
        .await;
        assert_eq!(body, "malformed_callback");

        let (_, body) = run(
            service(flow_returning_token(0)),
            get("/callback?error=access_denied&state=S1", Some("S1")),
        )
        .await;
        assert_eq!(body, "malformed_callback");
    }

    #[tokio::test]
    async fn test_form_post_callback_keeps_body() {
        let mut req = http::Request::builder()
            .method(Method::POST)
            .uri("/callback?state=ignored")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("code=xyz&state=S1"))
            .unwrap();
        context::with_state(req.extensions_mut(), "S1");

        let (status, body) = run(service(flow_returning_token(1)), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "token-for-xyz|code=xyz&state=S1");
    }

    #[tokio::test]
    async fn test_exchange_failure_skips_success_handler() {
        let mut flow = MockAuthorizationCodeFlow::new();
        flow.expect_exchange_code().times(1).returning(|_| {
            Err(OAuth2Error::Network(NetworkError::Timeout {
                timeout: Duration::from_secs(5),
            })
            .into_token_exchange())
        });

        let (status, body) = run(
            service(Arc::new(flow)),
            get("/callback?code=abc&state=S1", Some("S1")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "token_exchange_failed");
    }

    #[tokio::test]
    async fn test_replay_guard_rejects_second_use() {
        let guard = Arc::new(InMemoryReplayGuard::new(Duration::from_secs(60)));
        let service = CallbackLayer::new(flow_returning_token(1))
            .failure_handler(failure())
            .replay_guard(guard)
            .layer(success());

        let (status, _) = run(
            service.clone(),
            get("/callback?code=abc&state=S1", Some("S1")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = run(service, get("/callback?code=abc&state=S1", Some("S1"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "invalid_state");
    }

    #[tokio::test]
    async fn test_default_failure_handler_body() {
        let service = CallbackLayer::new(flow_returning_token(0)).layer(success());
        let response = service
            .oneshot(get("/callback?code=abc&state=X", Some("Y")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error, Unauthorized");
    }
}
