//! LinkedIn
//!
//! Basic profile from the v1 people API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::OAuth2Error;
use crate::providers::{fetch_json, Identity, ProfileResponse, ProviderAdapter};
use crate::types::{TokenResponse, DEFAULT_TIMEOUT_MS};

pub const LINKEDIN_API: &str = "https://api.linkedin.com";

const PEOPLE_PATH: &str = "/v1/people/~:(id,firstName,lastName,email-address,picture-url)?format=json";

/// LinkedIn user. Ids are unique per application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkedInUser {
    pub id: String,
    pub email_address: String,
    pub first_name: String,
    pub last_name: String,
    pub picture_url: String,
}

impl Identity for LinkedInUser {
    fn identity(&self) -> &str {
        &self.id
    }
}

/// LinkedIn profile adapter.
pub struct LinkedInAdapter<T> {
    base_url: String,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> LinkedInAdapter<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            base_url: LINKEDIN_API.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            transport,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> ProviderAdapter for LinkedInAdapter<T> {
    type User = LinkedInUser;

    fn name(&self) -> &str {
        "linkedin"
    }

    async fn fetch_user(
        &self,
        token: &TokenResponse,
    ) -> Result<ProfileResponse<LinkedInUser>, OAuth2Error> {
        let request = HttpRequest::get(format!("{}{}", self.base_url, PEOPLE_PATH))
            .header("authorization", token.authorization_header())
            .timeout(self.timeout);
        fetch_json(self.transport.as_ref(), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockHttpTransport;
    use crate::providers::validate_response;
    use serde_json::json;

    #[tokio::test]
    async fn test_people() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            200,
            &json!({"id": "1234", "firstName": "Alice", "lastName": "Smith", "emailAddress": "a@example.com"}),
        );
        let adapter = LinkedInAdapter::new(transport.clone()).with_base_url("http://127.0.0.1:9/");

        let fetched = adapter.fetch_user(&TokenResponse::bearer("any-token")).await;
        let user = validate_response(adapter.name(), fetched).unwrap();
        assert_eq!(user.id, "1234");
        assert_eq!(user.first_name, "Alice");
        assert_eq!(user.email_address, "a@example.com");

        let request = transport.get_last_request().unwrap();
        assert_eq!(
            request.url,
            "http://127.0.0.1:9/v1/people/~:(id,firstName,lastName,email-address,picture-url)?format=json"
        );
    }

    #[tokio::test]
    async fn test_missing_id_is_rejected() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(200, &json!({"firstName": "Alice"}));
        let adapter = LinkedInAdapter::new(transport);

        let fetched = adapter.fetch_user(&TokenResponse::bearer("any-token")).await;
        assert!(validate_response(adapter.name(), fetched).is_err());
    }
}
