//! Cookie Types
//!
//! Configuration of the short-lived state cookie.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default state cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "oauth2-login-state";

/// Default state cookie lifetime, long enough for one login round trip.
pub const DEFAULT_COOKIE_MAX_AGE_SECS: u64 = 60;

/// State cookie configuration.
///
/// Must be identical on the login and callback routes, since the callback
/// reads back the cookie the login route issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie name.
    pub name: String,
    /// Cookie path.
    pub path: String,
    /// Cookie domain (host-only when absent).
    pub domain: Option<String>,
    /// Lifetime in seconds.
    pub max_age_secs: u64,
    /// HTTP-only cookie.
    pub http_only: bool,
    /// Secure cookie (HTTPS only).
    pub secure: bool,
    /// SameSite policy.
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            path: "/".to_string(),
            domain: None,
            max_age_secs: DEFAULT_COOKIE_MAX_AGE_SECS,
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for local development over plain HTTP.
    ///
    /// Identical to the default except the cookie is not marked `Secure`.
    /// Never use it in production.
    pub fn debug_only() -> Self {
        Self {
            secure: false,
            ..Self::default()
        }
    }

    /// Set cookie name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set cookie path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set cookie domain.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set cookie lifetime.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age_secs = max_age.as_secs();
        self
    }

    /// Set SameSite policy.
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Set Secure flag.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Lifetime as a duration.
    pub fn max_age_duration(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// SameSite cookie policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Strict same-site policy. Breaks the provider redirect back in most browsers.
    Strict,
    /// Lax same-site policy (sent on top-level navigations such as the callback).
    #[default]
    Lax,
    /// No same-site restriction (requires Secure).
    None,
}

impl SameSite {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}
