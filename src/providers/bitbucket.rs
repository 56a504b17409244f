//! Bitbucket
//!
//! Current user from `/2.0/user`, then the primary address from
//! `/2.0/user/emails`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::OAuth2Error;
use crate::providers::{fetch_json, Identity, ProfileResponse, ProviderAdapter};
use crate::types::{TokenResponse, DEFAULT_TIMEOUT_MS};

pub const BITBUCKET_API: &str = "https://api.bitbucket.org/2.0";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub href: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitbucketLinks {
    pub avatar: Link,
    pub html: Link,
}

/// Bitbucket user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitbucketUser {
    pub uuid: String,
    pub username: String,
    pub display_name: String,
    pub links: BitbucketLinks,
    pub website: String,
    pub email: String,
    #[serde(rename = "is_confirmed")]
    pub is_email_confirmed: bool,
}

impl Identity for BitbucketUser {
    fn identity(&self) -> &str {
        &self.uuid
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserEmail {
    email: String,
    is_confirmed: bool,
    is_primary: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserEmails {
    values: Vec<UserEmail>,
}

/// Bitbucket profile adapter.
pub struct BitbucketAdapter<T> {
    base_url: String,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> BitbucketAdapter<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            base_url: BITBUCKET_API.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            transport,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, path: &str, token: &TokenResponse) -> HttpRequest {
        HttpRequest::get(format!("{}/{}", self.base_url, path))
            .header("authorization", token.authorization_header())
            .timeout(self.timeout)
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> ProviderAdapter for BitbucketAdapter<T> {
    type User = BitbucketUser;

    fn name(&self) -> &str {
        "bitbucket"
    }

    async fn fetch_user(
        &self,
        token: &TokenResponse,
    ) -> Result<ProfileResponse<BitbucketUser>, OAuth2Error> {
        let mut response: ProfileResponse<BitbucketUser> =
            fetch_json(self.transport.as_ref(), self.request("user", token)).await?;
        let Some(user) = response.user.as_mut() else {
            return Ok(response);
        };

        // An unreachable emails endpoint fails the fetch; a non-200 one only
        // leaves the address empty.
        let emails: ProfileResponse<UserEmails> =
            fetch_json(self.transport.as_ref(), self.request("user/emails", token)).await?;
        if let Some(primary) = emails
            .user
            .unwrap_or_default()
            .values
            .into_iter()
            .find(|e| e.is_primary)
        {
            user.email = primary.email;
            user.is_email_confirmed = primary.is_confirmed;
        }
        Ok(response)
    }
}
