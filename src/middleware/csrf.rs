//! CSRF Stage
//!
//! Issues or reuses the correlation value, sets the state cookie and
//! publishes the value to the request scope.
//!
//! Apply it with the same [`CookieConfig`] on both the login and the callback
//! route: the callback needs the value the login route issued moments earlier.

use axum::extract::Request;
use axum::response::Response;
use http::header::SET_COOKIE;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use url::form_urlencoded;

use crate::context;
use crate::core::cookie;
use crate::core::state::{generate_state, redact};
use crate::error::OAuth2Error;
use crate::middleware::failure::{respond_with_failure, DefaultFailureHandler};
use crate::middleware::BoxFuture;
use crate::telemetry::{HandshakeMetrics, NoOpMetrics, OAuth2SpanNames, OAuth2Stages};
use crate::types::{CookieConfig, ExtendedState, Transport, REDIRECT_TO_PARAM, TRANSPORT_PARAM};

/// What a freshly issued state value carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StateMode {
    /// Bare correlation value.
    #[default]
    Plain,
    /// [`ExtendedState`] built from the `redirectTo` and `transport` query parameters.
    Extended,
}

/// Layer for the CSRF stage.
#[derive(Clone)]
pub struct CsrfLayer<F = DefaultFailureHandler> {
    cookie: Arc<CookieConfig>,
    mode: StateMode,
    failure: F,
    metrics: Arc<dyn HandshakeMetrics>,
}

impl CsrfLayer {
    /// Create CSRF layer issuing plain correlation values.
    pub fn new(cookie: CookieConfig) -> Self {
        Self {
            cookie: Arc::new(cookie),
            mode: StateMode::Plain,
            failure: DefaultFailureHandler,
            metrics: Arc::new(NoOpMetrics),
        }
    }
}

impl<F> CsrfLayer<F> {
    /// Issue [`ExtendedState`] values instead (hosted login).
    pub fn extended(mut self) -> Self {
        self.mode = StateMode::Extended;
        self
    }

    /// Set the service run when a state value cannot be issued.
    pub fn failure_handler<G>(self, failure: G) -> CsrfLayer<G> {
        CsrfLayer {
            cookie: self.cookie,
            mode: self.mode,
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

impl<S, F: Clone> Layer<S> for CsrfLayer<F> {
    type Service = CsrfService<S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            cookie: self.cookie.clone(),
            mode: self.mode,
            failure: self.failure.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// CSRF stage service.
#[derive(Clone)]
pub struct CsrfService<S, F = DefaultFailureHandler> {
    inner: S,
    cookie: Arc<CookieConfig>,
    mode: StateMode,
    failure: F,
    metrics: Arc<dyn HandshakeMetrics>,
}

fn fresh_value(req: &Request, mode: StateMode) -> Result<String, OAuth2Error> {
    let csrf = generate_state()?;
    match mode {
        StateMode::Plain => Ok(csrf.into_string()),
        StateMode::Extended => {
            let mut state = ExtendedState::new(csrf.into_string());
            let query = req.uri().query().unwrap_or("");
            let mut transport = None;
            // First occurrence of each parameter wins.
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    REDIRECT_TO_PARAM if state.redirect_to.is_empty() => {
                        state.redirect_to = value.into_owned();
                    }
                    TRANSPORT_PARAM if transport.is_none() => {
                        transport = Some(Transport::from_param(&value));
                    }
                    _ => {}
                }
            }
            state.transport = transport.unwrap_or_default();
            state.encode()
        }
    }
}

impl<S, F> Service<Request> for CsrfService<S, F>
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

    fn call(&mut self, mut req: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = self.cookie.clone();
        let mode = self.mode;
        let failure = self.failure.clone();
        let metrics = self.metrics.clone();

        let span = tracing::debug_span!(OAuth2SpanNames::CSRF, path = %req.uri().path());

        Box::pin(
            async move {
                if let Some(value) = cookie::read(req.headers(), &config) {
                    tracing::debug!(state = %redact(&value), "reusing state cookie");
                    context::with_state(req.extensions_mut(), value);
                    return inner.call(req).await;
                }

                let issued = fresh_value(&req, mode)
                    .and_then(|value| cookie::issue(&config, &value).map(|header| (value, header)));
                let (value, set_cookie) = match issued {
                    Ok(issued) => issued,
                    Err(error) => {
                        return Ok(respond_with_failure(
                            failure,
                            req,
                            error,
                            OAuth2Stages::CSRF,
                            &metrics,
                        )
                        .await)
                    }
                };

                tracing::debug!(state = %redact(&value), "issued state cookie");
                metrics.record_state_issued();
                context::with_state(req.extensions_mut(), value);

                let mut response = inner.call(req).await?;
                response.headers_mut().append(SET_COOKIE, set_cookie);
                Ok(response)
            }
            .instrument(span),
        )
    }
}
