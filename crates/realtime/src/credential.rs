//! Ephemeral credential acquisition.
//!
//! The signaling endpoint authenticates with a short-lived bearer token that
//! a backend exchange mints on demand. The session controller calls
//! [`CredentialProvider::mint`] once per connect attempt, immediately before
//! signaling begins.

use crate::error::SessionError;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

/// A short-lived bearer credential for the signaling endpoint.
#[derive(Clone, Debug)]
pub struct RealtimeCredential {
    pub token: SecretString,
}

/// Mints a bearer credential for one connect attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn mint(&self) -> Result<RealtimeCredential, SessionError>;
}

/// Response body of the token-minting exchange.
#[derive(Deserialize)]
struct MintResponse {
    token: String,
}

/// Mints credentials from a backend HTTP endpoint returning `{"token": "..."}`.
pub struct HttpCredentialProvider {
    client: reqwest::Client,
    mint_url: String,
}

impl HttpCredentialProvider {
    pub fn new(mint_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            mint_url,
        }
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn mint(&self) -> Result<RealtimeCredential, SessionError> {
        debug!(url = %self.mint_url, "Minting realtime credential");
        let response = self
            .client
            .post(&self.mint_url)
            .send()
            .await
            .map_err(|e| SessionError::Credential(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SessionError::Credential(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: MintResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Credential(format!("malformed token response: {}", e)))?;

        Ok(RealtimeCredential {
            token: body.token.into(),
        })
    }
}

/// Wraps a long-lived API key as the credential. Development use only; a
/// deployed client should always mint ephemeral tokens server-side.
pub struct StaticCredentialProvider {
    token: SecretString,
}

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn mint(&self) -> Result<RealtimeCredential, SessionError> {
        Ok(RealtimeCredential {
            token: self.token.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_static_provider_returns_configured_token() {
        let provider = StaticCredentialProvider::new("sk-test-123");
        let credential = provider.mint().await.unwrap();
        assert_eq!(credential.token.expose_secret(), "sk-test-123");
    }

    #[tokio::test]
    async fn test_http_provider_rejects_unreachable_endpoint() {
        // Port 1 is never listening; the mint must settle as a Credential
        // error rather than hang or panic.
        let provider = HttpCredentialProvider::new("http://127.0.0.1:1/mint".to_string());
        let err = provider.mint().await.unwrap_err();
        assert!(matches!(err, SessionError::Credential(_)));
    }
}
