//! OAuth2 Login
//!
//! Server side of the OAuth 2.0 Authorization Code flow (RFC 6749) as tower
//! middleware, reusable across identity providers.
//!
//! # Handshake
//!
//! Two independent requests are correlated through a short-lived state cookie:
//!
//! - `/login`: [`CsrfLayer`] issues the state, [`LoginService`] redirects to the
//!   provider with it
//! - `/callback`: [`CsrfLayer`] reads the state back, [`CallbackLayer`] checks
//!   it against the provider's `state` parameter and exchanges the code;
//!   an optional [`ProviderLayer`] then fetches the user
//!
//! Stages hand values forward through request extensions, readable with the
//! [`context`] functions or the [`OAuth2Token`], [`LoginUser`] and
//! [`LoginError`] extractors.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{handler::HandlerWithoutStateExt, Router};
//! use oauth2_login::providers::slack::{SlackAdapter, SlackUser};
//! use oauth2_login::{oauth2_config, LoginUser, OAuth2Login};
//!
//! async fn welcome(LoginUser(user): LoginUser<SlackUser>) -> String {
//!     format!("Welcome {}", user.name)
//! }
//!
//! let config = oauth2_config()
//!     .client_id("client-id")
//!     .client_secret("client-secret")
//!     .authorization_endpoint("https://slack.com/oauth/authorize")
//!     .token_endpoint("https://slack.com/api/oauth.access")
//!     .redirect_uri("https://app.example.com/slack/callback")
//!     .add_scope("identity.basic")
//!     .build()?;
//!
//! let login = OAuth2Login::new(config)?;
//! let slack = SlackAdapter::new(login.transport())?;
//! let app = Router::new()
//!     .route_service("/slack/login", login.login_handler())
//!     .route_service(
//!         "/slack/callback",
//!         login.provider_callback_handler_default(slack, welcome.into_service()),
//!     );
//! ```
//!
//! # Modules
//!
//! - `core`: state generation, cookie codec, HTTP transport, OIDC discovery
//! - `middleware`: the CSRF, login and callback stages
//! - `providers`: profile adapters and the provider stage
//! - `flows`: authorization URL and token exchange
//! - `context`: request-scoped values
//! - `error`: error hierarchy
//! - `telemetry`: span names and metrics

pub mod builders;
pub mod client;
pub mod context;
pub mod core;
pub mod error;
pub mod flows;
pub mod middleware;
pub mod providers;
pub mod telemetry;
pub mod types;

pub use client::OAuth2Login;

pub use builders::{oauth2_config, OAuth2ConfigBuilder};

pub use context::{LoginError, LoginUser, OAuth2State, OAuth2Token};

pub use core::{
    generate_state, CorrelationState, DefaultDiscoveryClient, DiscoveryClient, HttpTransport,
    InMemoryReplayGuard, ReplayGuard, ReqwestHttpTransport,
};

pub use error::{ErrorKind, OAuth2Error, OAuth2Result};

pub use flows::{AuthorizationCodeFlow, AuthorizationCodeFlowImpl};

pub use middleware::{
    CallbackLayer, CallbackService, CsrfLayer, CsrfService, DefaultFailureHandler, LoginService,
    StateMode, DEFAULT_FAILURE_BODY,
};

pub use providers::{Identity, ProfileResponse, ProviderAdapter, ProviderLayer, ProviderService};

pub use telemetry::{HandshakeMetrics, InMemoryMetrics, NoOpMetrics};

pub use types::{
    CallbackParams, ClientAuthMethod, CookieConfig, ExtendedState, OAuth2Config, ProviderConfig,
    SameSite, TokenResponse, Transport,
};
