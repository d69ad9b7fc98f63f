use async_trait::async_trait;
use displaydoc::Display;
use serde::Deserialize;
use thiserror::Error;

use crate::config::KeycloakConfig;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// Failed to build federated auth client: {0}
    BuildClient(reqwest::Error),
    /// Federated userinfo request failed: {0}
    SendRequest(reqwest::Error),
    /// Federated userinfo returned {0} with an unreadable body: {1}
    ParseResponse(reqwest::StatusCode, reqwest::Error),
}

/// Identity asserted by the federated provider for a valid bearer.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedIdentity {
    #[serde(rename = "preferred_username")]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Seam for the external identity provider. `Ok(None)` means the bearer was
/// examined and rejected; errors mean the provider could not be consulted.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, bearer: &str) -> Result<Option<FederatedIdentity>, Error>;

    fn enabled(&self) -> bool {
        true
    }
}

/// Installed when no federated provider is configured.
pub struct FederatedAuthDisabled;

#[async_trait]
impl TokenValidator for FederatedAuthDisabled {
    async fn validate(&self, _bearer: &str) -> Result<Option<FederatedIdentity>, Error> {
        Ok(None)
    }

    fn enabled(&self) -> bool {
        false
    }
}

pub struct Keycloak {
    client: reqwest::Client,
    userinfo_url: String,
}

impl Keycloak {
    pub fn new(config: &KeycloakConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::BuildClient)?;
        let base = config.url.trim_end_matches('/');
        let userinfo_url = format!(
            "{base}/realms/{}/protocol/openid-connect/userinfo",
            config.realm
        );
        Ok(Keycloak {
            client,
            userinfo_url,
        })
    }

    #[cfg(test)]
    pub fn with_userinfo_url(userinfo_url: String) -> Self {
        Keycloak {
            client: reqwest::Client::new(),
            userinfo_url,
        }
    }
}

#[async_trait]
impl TokenValidator for Keycloak {
    async fn validate(&self, bearer: &str) -> Result<Option<FederatedIdentity>, Error> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(Error::SendRequest)?;

        let status = response.status();
        if status.is_success() {
            let identity = response
                .json()
                .await
                .map_err(|err| Error::ParseResponse(status, err))?;
            return Ok(Some(identity));
        }
        // An invalid or expired bearer is a rejection, not a provider fault.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_valid_bearer() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/userinfo")
            .match_header("authorization", "Bearer good-token")
            .with_status(200)
            .with_body(r#"{"preferred_username":"alice","email":"alice@example.com"}"#)
            .create_async()
            .await;

        let keycloak = Keycloak::with_userinfo_url(format!("{}/userinfo", server.url()));
        let identity = keycloak.validate("good-token").await.unwrap().unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.email, "alice@example.com");
    }

    #[tokio::test]
    async fn rejects_invalid_bearer() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/userinfo")
            .with_status(401)
            .with_body(r#"{"error":"invalid_token"}"#)
            .create_async()
            .await;

        let keycloak = Keycloak::with_userinfo_url(format!("{}/userinfo", server.url()));
        assert!(keycloak.validate("bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_validator_never_matches() {
        let disabled = FederatedAuthDisabled;
        assert!(!disabled.enabled());
        assert!(disabled.validate("anything").await.unwrap().is_none());
    }
}
