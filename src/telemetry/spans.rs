//! Span Names
//!
//! Names of the `tracing` spans opened by each handshake stage.

/// OAuth2 login span names.
pub struct OAuth2SpanNames;

impl OAuth2SpanNames {
    pub const CSRF: &'static str = "oauth2.csrf";
    pub const LOGIN: &'static str = "oauth2.login";
    pub const CALLBACK: &'static str = "oauth2.callback";
    pub const TOKEN_EXCHANGE: &'static str = "oauth2.token_exchange";
    pub const USER_FETCH: &'static str = "oauth2.user_fetch";
}

/// Stage labels used in failure metrics and log events.
pub struct OAuth2Stages;

impl OAuth2Stages {
    pub const CSRF: &'static str = "csrf";
    pub const LOGIN: &'static str = "login";
    pub const CALLBACK: &'static str = "callback";
    pub const PROVIDER: &'static str = "provider";
}
