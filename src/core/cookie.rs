//! State Cookie Codec
//!
//! Renders and reads the short-lived cookie that carries the correlation
//! value between the login redirect and the callback.

use cookie::time::Duration as CookieDuration;
use cookie::Cookie;
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};

use crate::error::{ConfigurationError, OAuth2Error};
use crate::types::{CookieConfig, SameSite};

impl From<SameSite> for cookie::SameSite {
    fn from(same_site: SameSite) -> Self {
        match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

fn build<'c>(config: &CookieConfig, value: &'c str, max_age_secs: i64) -> Cookie<'c> {
    let mut builder = Cookie::build((config.name.clone(), value))
        .path(config.path.clone())
        .max_age(CookieDuration::seconds(max_age_secs))
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(config.same_site.into());

    if let Some(domain) = &config.domain {
        builder = builder.domain(domain.clone());
    }

    builder.build()
}

fn to_header(cookie: &Cookie<'_>) -> Result<HeaderValue, OAuth2Error> {
    HeaderValue::from_str(&cookie.to_string()).map_err(|e| {
        ConfigurationError::InvalidCookie {
            message: e.to_string(),
        }
        .into()
    })
}

/// Render the `Set-Cookie` header value storing `value`.
pub fn issue(config: &CookieConfig, value: &str) -> Result<HeaderValue, OAuth2Error> {
    let max_age = i64::try_from(config.max_age_secs).unwrap_or(i64::MAX);
    to_header(&build(config, value, max_age))
}

/// Render a `Set-Cookie` header value that expires the state cookie.
pub fn clear(config: &CookieConfig) -> Result<HeaderValue, OAuth2Error> {
    to_header(&build(config, "", 0))
}

/// Read the state cookie from request headers.
///
/// Returns the first cookie with the configured name across all `Cookie`
/// headers. An empty value counts as absent.
pub fn read(headers: &HeaderMap, config: &CookieConfig) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == config.name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
