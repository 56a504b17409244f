//! OAuth2 Login
//!
//! Facade that wires the handshake stages for one provider registration and
//! hands out ready-to-mount services.
//!
//! ```rust,ignore
//! let login = OAuth2Login::new(config)?;
//! let app = Router::new()
//!     .route_service("/login", login.login_handler())
//!     .route_service("/callback", login.callback_handler(welcome.into_service()));
//! ```

use std::sync::Arc;
use tower::Layer;

use crate::core::state::{InMemoryReplayGuard, ReplayGuard};
use crate::core::transport::{create_transport, HttpTransport, ReqwestHttpTransport};
use crate::error::OAuth2Error;
use crate::flows::{AuthorizationCodeFlow, AuthorizationCodeFlowImpl};
use crate::middleware::{
    CallbackLayer, CallbackService, CsrfLayer, CsrfService, DefaultFailureHandler, LoginService,
};
use crate::providers::{ProviderAdapter, ProviderLayer, ProviderService};
use crate::telemetry::{HandshakeMetrics, NoOpMetrics};
use crate::types::{CookieConfig, OAuth2Config};

/// Login handshake for one provider registration.
pub struct OAuth2Login<T: HttpTransport = ReqwestHttpTransport> {
    config: Arc<OAuth2Config>,
    transport: Arc<T>,
    flow: Arc<dyn AuthorizationCodeFlow>,
    cookie: CookieConfig,
    extended_state: bool,
    metrics: Arc<dyn HandshakeMetrics>,
    replay_guard: Option<Arc<dyn ReplayGuard>>,
}

impl OAuth2Login<ReqwestHttpTransport> {
    /// Create a login handshake talking to the provider over reqwest.
    pub fn new(config: OAuth2Config) -> Result<Self, OAuth2Error> {
        let transport = create_transport(Some(config.timeout))?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: HttpTransport + 'static> OAuth2Login<T> {
    /// Create a login handshake with a custom transport.
    pub fn with_transport(config: OAuth2Config, transport: T) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(transport);
        let flow = Arc::new(AuthorizationCodeFlowImpl::new(
            config.clone(),
            transport.clone(),
        ));
        Self {
            config,
            transport,
            flow,
            cookie: CookieConfig::default(),
            extended_state: false,
            metrics: Arc::new(NoOpMetrics),
            replay_guard: None,
        }
    }
}

impl<T: HttpTransport> OAuth2Login<T> {
    /// Replace the authorization code flow.
    pub fn with_flow(mut self, flow: Arc<dyn AuthorizationCodeFlow>) -> Self {
        self.flow = flow;
        self
    }

    /// State cookie settings, shared by the login and callback routes.
    pub fn cookie_config(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Issue [`ExtendedState`](crate::types::ExtendedState) values carrying
    /// the login request's `redirectTo` and `transport` parameters.
    pub fn extended_state(mut self) -> Self {
        self.extended_state = true;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn HandshakeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Reject state values already used on a validated callback.
    pub fn replay_guard(mut self, guard: Arc<dyn ReplayGuard>) -> Self {
        self.replay_guard = Some(guard);
        self
    }

    /// [`replay_guard`](Self::replay_guard) with an in-memory guard remembering
    /// states as long as the current cookie max-age.
    pub fn single_use_state(self) -> Self {
        let ttl = self.cookie.max_age_duration();
        self.replay_guard(Arc::new(InMemoryReplayGuard::new(ttl)))
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Transport shared with provider adapters.
    pub fn transport(&self) -> Arc<T> {
        self.transport.clone()
    }

    pub fn flow(&self) -> Arc<dyn AuthorizationCodeFlow> {
        self.flow.clone()
    }

    pub fn csrf_layer(&self) -> CsrfLayer {
        let layer = CsrfLayer::new(self.cookie.clone()).metrics(self.metrics.clone());
        if self.extended_state {
            layer.extended()
        } else {
            layer
        }
    }

    pub fn login_service(&self) -> LoginService {
        LoginService::new(self.flow.clone()).metrics(self.metrics.clone())
    }

    pub fn callback_layer(&self) -> CallbackLayer {
        let layer = CallbackLayer::new(self.flow.clone()).metrics(self.metrics.clone());
        match &self.replay_guard {
            Some(guard) => layer.replay_guard(guard.clone()),
            None => layer,
        }
    }

    pub fn provider_layer<P: ProviderAdapter>(&self, adapter: P) -> ProviderLayer<P> {
        ProviderLayer::new(adapter).metrics(self.metrics.clone())
    }

    /// CSRF + login redirect, failing with the default 500 response.
    pub fn login_handler(&self) -> CsrfService<LoginService> {
        self.csrf_layer().layer(self.login_service())
    }

    /// CSRF + login redirect with a custom failure service.
    pub fn login_handler_with<F: Clone>(&self, failure: F) -> CsrfService<LoginService<F>, F> {
        self.csrf_layer()
            .failure_handler(failure.clone())
            .layer(self.login_service().failure_handler(failure))
    }

    /// CSRF + callback validation + token exchange, then `success`.
    pub fn callback_handler<S>(&self, success: S) -> CsrfService<CallbackService<S>> {
        self.csrf_layer().layer(self.callback_layer().layer(success))
    }

    /// [`callback_handler`](Self::callback_handler) with a custom failure service.
    pub fn callback_handler_with<S, F: Clone>(
        &self,
        success: S,
        failure: F,
    ) -> CsrfService<CallbackService<S, F>, F> {
        self.csrf_layer().failure_handler(failure.clone()).layer(
            self.callback_layer()
                .failure_handler(failure)
                .layer(success),
        )
    }

    /// Callback route that also fetches the provider user before `success`.
    pub fn provider_callback_handler<P, S, F>(
        &self,
        adapter: P,
        success: S,
        failure: F,
    ) -> CsrfService<CallbackService<ProviderService<P, S, F>, F>, F>
    where
        P: ProviderAdapter,
        F: Clone,
    {
        let provider = self
            .provider_layer(adapter)
            .failure_handler(failure.clone())
            .layer(success);
        self.callback_handler_with(provider, failure)
    }

    /// [`provider_callback_handler`](Self::provider_callback_handler) with the
    /// default failure response.
    pub fn provider_callback_handler_default<P, S>(
        &self,
        adapter: P,
        success: S,
    ) -> CsrfService<CallbackService<ProviderService<P, S>>>
    where
        P: ProviderAdapter,
    {
        self.provider_callback_handler(adapter, success, DefaultFailureHandler)
    }
}
