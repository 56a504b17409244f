//! Callback Types
//!
//! Parameters of the provider's redirect back to the callback route.

use url::form_urlencoded;
use url::Url;

use crate::error::{CallbackError, OAuth2Error};

/// Callback parameters from the authorization redirect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code (if success).
    pub code: Option<String>,
    /// State parameter.
    pub state: Option<String>,
    /// Error code (if authorization failed).
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
    /// Error URI.
    pub error_uri: Option<String>,
}

impl CallbackParams {
    /// Collect parameters from key/value pairs. The first occurrence of a key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                "error_uri" => &mut params.error_uri,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        params
    }

    /// Parse an `application/x-www-form-urlencoded` string (query or body).
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    /// Parse callback parameters from URL.
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs().into_owned())
    }

    /// Fill fields missing here from `other`.
    pub fn or(mut self, other: Self) -> Self {
        self.code = self.code.or(other.code);
        self.state = self.state.or(other.state);
        self.error = self.error.or(other.error);
        self.error_description = self.error_description.or(other.error_description);
        self.error_uri = self.error_uri.or(other.error_uri);
        self
    }

    /// Check if callback contains an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extract `(code, state)`; empty values count as missing.
    pub fn into_validated(self) -> Result<(String, String), OAuth2Error> {
        let code = self.code.filter(|c| !c.is_empty());
        let state = self.state.filter(|s| !s.is_empty());

        match (code, state) {
            (Some(code), Some(state)) => Ok((code, state)),
            (None, _) if self.error.is_some() => Err(CallbackError::Denied {
                error: self.error.unwrap_or_default(),
                error_description: self.error_description,
                error_uri: self.error_uri,
            }
            .into()),
            (None, _) => Err(CallbackError::Malformed {
                message: "missing code".to_string(),
            }
            .into()),
            (Some(_), None) => Err(CallbackError::Malformed {
                message: "missing state".to_string(),
            }
            .into()),
        }
    }
}
