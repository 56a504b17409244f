//! Sign in with Slack
//!
//! Profile from `users.identity`. Slack takes the token as a query parameter
//! and wraps the answer in an `{ok, user, team}` envelope; `ok: false`
//! yields no user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, OAuth2Error};
use crate::providers::{fetch_json, Identity, ProfileResponse, ProviderAdapter};
use crate::types::{TokenResponse, DEFAULT_TIMEOUT_MS};

pub const SLACK_API: &str = "https://slack.com/api/";

/// Slack workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackTeam {
    pub id: String,
    pub name: String,
}

/// Slack user. Ids are unique per application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image_24: String,
    pub image_32: String,
    pub image_48: String,
    pub image_72: String,
    pub image_192: String,
    pub image_512: String,
    /// Filled from the envelope, not the `user` object.
    #[serde(skip_deserializing)]
    pub team: SlackTeam,
}

impl Identity for SlackUser {
    fn identity(&self) -> &str {
        &self.id
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    user: SlackUser,
    #[serde(default)]
    team: SlackTeam,
}

impl Envelope {
    fn into_user(self) -> Option<SlackUser> {
        if !self.ok {
            return None;
        }
        let mut user = self.user;
        user.team = self.team;
        Some(user)
    }
}

/// Slack profile adapter.
pub struct SlackAdapter<T> {
    base_url: Url,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> SlackAdapter<T> {
    pub fn new(transport: Arc<T>) -> Result<Self, OAuth2Error> {
        Ok(Self {
            base_url: parse_base(SLACK_API)?,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            transport,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, OAuth2Error> {
        self.base_url = parse_base(base_url)?;
        Ok(self)
    }

    fn request(&self, token: &TokenResponse) -> Result<HttpRequest, OAuth2Error> {
        let mut url = self.base_url.join("users.identity").map_err(|_| {
            ConfigurationError::InvalidEndpoint {
                url: self.base_url.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("token", &token.access_token);
        Ok(HttpRequest::get(url.as_str()).timeout(self.timeout))
    }
}

// Url::join drops the last path segment unless the base ends with '/'.
fn parse_base(base_url: &str) -> Result<Url, OAuth2Error> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    Url::parse(&normalized).map_err(|_| {
        ConfigurationError::InvalidEndpoint {
            url: base_url.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl<T: HttpTransport + 'static> ProviderAdapter for SlackAdapter<T> {
    type User = SlackUser;

    fn name(&self) -> &str {
        "slack"
    }

    async fn fetch_user(
        &self,
        token: &TokenResponse,
    ) -> Result<ProfileResponse<SlackUser>, OAuth2Error> {
        let response: ProfileResponse<Envelope> =
            fetch_json(self.transport.as_ref(), self.request(token)?).await?;
        Ok(ProfileResponse {
            status: response.status,
            user: response.user.and_then(Envelope::into_user),
        })
    }
}
