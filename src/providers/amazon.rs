//! Login with Amazon
//!
//! Profile from `https://api.amazon.com/user/profile`. User ids are unique
//! per application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::OAuth2Error;
use crate::providers::{fetch_json, Identity, ProfileResponse, ProviderAdapter};
use crate::types::{TokenResponse, DEFAULT_TIMEOUT_MS};

pub const AMAZON_API: &str = "https://api.amazon.com";

/// Amazon user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmazonUser {
    #[serde(rename = "user_id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "postal_code", default)]
    pub location: String,
}

impl Identity for AmazonUser {
    fn identity(&self) -> &str {
        &self.id
    }
}

/// Amazon profile adapter.
pub struct AmazonAdapter<T> {
    base_url: String,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> AmazonAdapter<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            base_url: AMAZON_API.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            transport,
        }
    }

    /// Point at another API host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> ProviderAdapter for AmazonAdapter<T> {
    type User = AmazonUser;

    fn name(&self) -> &str {
        "amazon"
    }

    async fn fetch_user(
        &self,
        token: &TokenResponse,
    ) -> Result<ProfileResponse<AmazonUser>, OAuth2Error> {
        // Amazon answers text/javascript unless JSON is asked for.
        let request = HttpRequest::get(format!("{}/user/profile", self.base_url))
            .header("authorization", token.authorization_header())
            .timeout(self.timeout);
        fetch_json(self.transport.as_ref(), request).await
    }
}
