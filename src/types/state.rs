//! Extended State
//!
//! Richer `state` payload carrying post-login redirect intent through the
//! provider round trip.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{OAuth2Error, ProtocolError};

/// URL-safe alphabet, padded on encode, padding-agnostic on decode.
const STATE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Login request query parameter naming the post-login destination.
pub const REDIRECT_TO_PARAM: &str = "redirectTo";

/// Login request query parameter naming the [`Transport`].
pub const TRANSPORT_PARAM: &str = "transport";

/// How the post-login page expects to receive its result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// In the URL fragment.
    Hash,
    /// In the query string.
    #[default]
    #[serde(other)]
    Query,
}

impl Transport {
    /// Parse a request parameter; anything unrecognised means `Query`.
    pub fn from_param(value: &str) -> Self {
        match value {
            "hash" => Self::Hash,
            _ => Self::Query,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Query => "query",
        }
    }
}

/// State payload: CSRF value plus redirect intent.
///
/// Encoded as JSON then URL-safe base64. The encoded string is used verbatim
/// as both the cookie value and the OAuth `state` parameter, so callback
/// validation stays an exact string comparison.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedState {
    /// Correlation value.
    pub csrf: String,
    /// Where to send the user after login.
    #[serde(default)]
    pub redirect_to: String,
    /// How the result is delivered to `redirect_to`.
    #[serde(default)]
    pub transport: Transport,
}

impl ExtendedState {
    pub fn new(csrf: impl Into<String>) -> Self {
        Self {
            csrf: csrf.into(),
            ..Default::default()
        }
    }

    pub fn redirect_to(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = redirect_to.into();
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Encode as base64(JSON).
    pub fn encode(&self) -> Result<String, OAuth2Error> {
        let json = serde_json::to_vec(self).map_err(|e| {
            OAuth2Error::Protocol(ProtocolError::InvalidStateEncoding {
                message: e.to_string(),
            })
        })?;
        Ok(STATE_ENGINE.encode(json))
    }

    /// Decode from base64(JSON).
    pub fn decode(encoded: &str) -> Result<Self, OAuth2Error> {
        let json = STATE_ENGINE.decode(encoded).map_err(|e| {
            OAuth2Error::Protocol(ProtocolError::InvalidStateEncoding {
                message: e.to_string(),
            })
        })?;
        serde_json::from_slice(&json).map_err(|e| {
            OAuth2Error::Protocol(ProtocolError::InvalidStateEncoding {
                message: e.to_string(),
            })
        })
    }
}
