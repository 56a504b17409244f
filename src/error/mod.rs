//! OAuth2 Login Error Types
//!
//! Error hierarchy for the login handshake. Every stage recovers its own
//! failures and hands them to the failure handler through the request-scope
//! error slot, so each error carries a stable [`ErrorKind`].

use std::time::Duration;
use thiserror::Error;

/// Root error type for the login handshake.
#[derive(Error, Debug)]
pub enum OAuth2Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("oauth2: token exchange failed: {0}")]
    TokenExchange(#[from] TokenExchangeError),

    #[error(transparent)]
    ProviderUser(#[from] ProviderUserError),

    #[error("oauth2: random source unavailable: {message}")]
    Entropy { message: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Failure classification handed to failure handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// State expected in request scope but absent (CSRF stage not applied).
    MissingState,
    /// Token expected in request scope but absent (callback stage not applied).
    MissingToken,
    /// User expected in request scope but absent (provider stage not applied).
    MissingUser,
    /// `code` or `state` absent from the provider redirect, including a
    /// redirect carrying the provider's `error` instead of a code.
    MalformedCallback,
    /// State mismatch or empty; treated as a potential CSRF attack.
    InvalidState,
    /// Transport error or non-success response from the token endpoint.
    TokenExchangeFailed,
    /// Transport error, non-200 status or empty identity from a profile endpoint.
    ProviderUserFetchFailed,
    /// Invalid configuration.
    Configuration,
    /// Internal failure, such as an unavailable random source.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingState => "missing_state",
            Self::MissingToken => "missing_token",
            Self::MissingUser => "missing_user",
            Self::MalformedCallback => "malformed_callback",
            Self::InvalidState => "invalid_state",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::ProviderUserFetchFailed => "provider_user_fetch_failed",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OAuth2Error {
    /// Classify the error for failure handlers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Context(ContextError::MissingState) => ErrorKind::MissingState,
            Self::Context(ContextError::MissingToken) => ErrorKind::MissingToken,
            Self::Context(ContextError::MissingUser) => ErrorKind::MissingUser,
            Self::Callback(CallbackError::Malformed { .. } | CallbackError::Denied { .. }) => {
                ErrorKind::MalformedCallback
            }
            Self::Callback(CallbackError::InvalidState) => ErrorKind::InvalidState,
            Self::TokenExchange(_) => ErrorKind::TokenExchangeFailed,
            Self::ProviderUser(_) => ErrorKind::ProviderUserFetchFailed,
            Self::Entropy { .. } | Self::Network(_) | Self::Protocol(_) => ErrorKind::Internal,
        }
    }

    /// True when the provider redirected back with an `error` parameter.
    pub fn is_authorization_denied(&self) -> bool {
        matches!(self, Self::Callback(CallbackError::Denied { .. }))
    }

    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "OAUTH2_CONFIG",
            Self::Context(_) => "OAUTH2_CONTEXT",
            Self::Callback(_) => "OAUTH2_CALLBACK",
            Self::TokenExchange(_) => "OAUTH2_TOKEN",
            Self::ProviderUser(_) => "OAUTH2_PROVIDER_USER",
            Self::Entropy { .. } => "OAUTH2_ENTROPY",
            Self::Network(_) => "OAUTH2_NETWORK",
            Self::Protocol(_) => "OAUTH2_PROTOCOL",
        }
    }

    /// Reclassify a transport failure as a failed token exchange.
    pub(crate) fn into_token_exchange(self) -> Self {
        match self {
            Self::Network(e) => Self::TokenExchange(TokenExchangeError::Network(e)),
            Self::Protocol(e) => Self::TokenExchange(TokenExchangeError::Protocol(e)),
            other => other,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Invalid cookie configuration: {message}")]
    InvalidCookie { message: String },

    #[error("Discovery failed: {message}")]
    DiscoveryFailed { message: String },
}

/// A request-scope slot was read before any stage wrote it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("oauth2: Context missing state value")]
    MissingState,

    #[error("oauth2: Context missing Token")]
    MissingToken,

    #[error("oauth2: Context missing User")]
    MissingUser,
}

/// Callback validation error.
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("oauth2: Request missing code or state: {message}")]
    Malformed { message: String },

    #[error("oauth2: authorization denied: {error}")]
    Denied {
        error: String,
        error_description: Option<String>,
        error_uri: Option<String>,
    },

    // Deliberately carries no detail about which side failed.
    #[error("oauth2: Invalid OAuth2 state parameter")]
    InvalidState,
}

/// Token endpoint failure.
#[derive(Error, Debug)]
pub enum TokenExchangeError {
    #[error("{0}")]
    Network(#[from] NetworkError),

    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

/// Provider adapter could not produce a usable user.
#[derive(Error, Debug)]
#[error("{provider}: unable to get {provider} user")]
pub struct ProviderUserError {
    /// Provider name.
    pub provider: String,
    /// Why the profile was rejected (logged, never shown to end users).
    pub reason: String,
}

impl ProviderUserError {
    pub fn new(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Invalid state encoding: {message}")]
    InvalidStateEncoding { message: String },
}

/// Provider (OAuth2 server) error.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid client credentials")]
    InvalidClient { error_description: Option<String> },

    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid scope: {scope}")]
    InvalidScope { scope: String },

    #[error("Unauthorized client for this grant type")]
    UnauthorizedClient { error_description: Option<String> },

    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType { grant_type: String },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Server temporarily unavailable")]
    TemporarilyUnavailable { retry_after: Option<Duration> },
}

/// Result type for OAuth2 operations.
pub type OAuth2Result<T> = Result<T, OAuth2Error>;

/// OAuth2 error response from provider (RFC 6749 Section 5.2).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Map token error response to error type.
pub fn map_token_error(response: &OAuth2ErrorResponse) -> ProviderError {
    let description = || response.error_description.clone();
    match response.error.as_str() {
        "invalid_client" => ProviderError::InvalidClient {
            error_description: description(),
        },
        "invalid_grant" => ProviderError::InvalidGrant {
            message: description().unwrap_or_else(|| "Invalid grant".to_string()),
        },
        "invalid_scope" => ProviderError::InvalidScope {
            scope: description().unwrap_or_default(),
        },
        "unauthorized_client" => ProviderError::UnauthorizedClient {
            error_description: description(),
        },
        "unsupported_grant_type" => ProviderError::UnsupportedGrantType {
            grant_type: description().unwrap_or_default(),
        },
        "server_error" => ProviderError::ServerError {
            message: description().unwrap_or_else(|| "Server error".to_string()),
        },
        "temporarily_unavailable" => ProviderError::TemporarilyUnavailable { retry_after: None },
        _ => ProviderError::InvalidRequest {
            message: description().unwrap_or_else(|| response.error.clone()),
        },
    }
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Create a token exchange error from a non-success token endpoint response.
pub fn create_error_from_response(status: u16, body: &str) -> OAuth2Error {
    if let Some(response) = parse_error_response(body) {
        return TokenExchangeError::Provider(map_token_error(&response)).into();
    }

    let error = match status {
        400 => ProviderError::InvalidRequest {
            message: "Bad request".to_string(),
        },
        401 => ProviderError::InvalidClient {
            error_description: Some("Unauthorized".to_string()),
        },
        403 => ProviderError::UnauthorizedClient {
            error_description: Some("Forbidden".to_string()),
        },
        429 => ProviderError::TemporarilyUnavailable {
            retry_after: Some(Duration::from_secs(60)),
        },
        _ => ProviderError::ServerError {
            message: format!("HTTP {}", status),
        },
    };

    TokenExchangeError::Provider(error).into()
}

/// Get user-friendly error message.
pub fn get_user_message(error: &OAuth2Error) -> &'static str {
    if error.is_authorization_denied() {
        return "Access was denied. Please try signing in again and grant the requested permissions.";
    }
    match error.kind() {
        ErrorKind::InvalidState | ErrorKind::MissingState => {
            "Security validation failed. Please restart the sign-in process."
        }
        ErrorKind::MalformedCallback => "The sign-in response was incomplete. Please try again.",
        ErrorKind::TokenExchangeFailed | ErrorKind::ProviderUserFetchFailed => {
            "The authentication service is temporarily unavailable. Please try again later."
        }
        _ => "An authentication error occurred. Please try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            OAuth2Error::from(ContextError::MissingState).kind(),
            ErrorKind::MissingState
        );
        assert_eq!(
            OAuth2Error::from(CallbackError::InvalidState).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            create_error_from_response(500, "oops").kind(),
            ErrorKind::TokenExchangeFailed
        );
        assert_eq!(
            OAuth2Error::from(ProviderUserError::new("slack", "empty id")).kind(),
            ErrorKind::ProviderUserFetchFailed
        );
    }

    #[test]
    fn test_denied_callback_is_malformed_kind() {
        let err = OAuth2Error::from(CallbackError::Denied {
            error: "access_denied".to_string(),
            error_description: None,
            error_uri: None,
        });
        assert_eq!(err.kind(), ErrorKind::MalformedCallback);
        assert!(err.is_authorization_denied());
        assert!(get_user_message(&err).starts_with("Access was denied"));

        let err = OAuth2Error::from(CallbackError::Malformed {
            message: "missing code".to_string(),
        });
        assert!(!err.is_authorization_denied());
    }

    #[test]
    fn test_context_error_messages() {
        assert_eq!(
            OAuth2Error::from(ContextError::MissingToken).to_string(),
            "oauth2: Context missing Token"
        );
        assert_eq!(
            OAuth2Error::from(CallbackError::InvalidState).to_string(),
            "oauth2: Invalid OAuth2 state parameter"
        );
    }

    #[test]
    fn test_provider_user_error_hides_reason() {
        let err = ProviderUserError::new("amazon", "status 500");
        assert_eq!(err.to_string(), "amazon: unable to get amazon user");
    }

    #[test]
    fn test_transport_errors_become_token_exchange() {
        let err = OAuth2Error::Network(NetworkError::Timeout {
            timeout: Duration::from_secs(5),
        })
        .into_token_exchange();
        assert_eq!(err.kind(), ErrorKind::TokenExchangeFailed);
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"error":"invalid_grant","error_description":"The code was already used"}"#;
        let response = parse_error_response(body).unwrap();
        assert_eq!(response.error, "invalid_grant");

        match create_error_from_response(400, body) {
            OAuth2Error::TokenExchange(TokenExchangeError::Provider(ProviderError::InvalidGrant {
                message,
            })) => assert_eq!(message, "The code was already used"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
