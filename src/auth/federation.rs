// Federated identity verification (Google Sign-In)
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::FederationConfig;
use crate::error::AppError;

/// Identity asserted by the external provider after verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a provider-issued credential and return the identity it names
    async fn verify(&self, credential: &str) -> Result<FederatedIdentity, AppError>;
}

#[derive(Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: serde_json::Value,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl TokenInfo {
    // tokeninfo returns "true"/"false" strings; some proxies return booleans
    fn email_verified(&self) -> bool {
        match &self.email_verified {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => s == "true",
            _ => false,
        }
    }
}

/// Checks Google ID tokens against the tokeninfo endpoint.
pub struct GoogleIdentityProvider {
    http: Client,
    client_id: Option<String>,
    tokeninfo_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(config: &FederationConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            client_id: config.google_client_id.clone(),
            tokeninfo_url: config.tokeninfo_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<FederatedIdentity, AppError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| AppError::Upstream("Google sign-in is not configured".into()))?;

        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Google tokeninfo request failed: {}", e);
                AppError::Upstream("Google authentication failed.".into())
            })?;

        if response.status().is_client_error() {
            return Err(AppError::Unauthorized("Invalid Google credential".into()));
        }
        if !response.status().is_success() {
            tracing::warn!("Google tokeninfo returned {}", response.status());
            return Err(AppError::Upstream("Google authentication failed.".into()));
        }

        let info: TokenInfo = response.json().await.map_err(|e| {
            tracing::warn!("Unreadable tokeninfo response: {}", e);
            AppError::Upstream("Google authentication failed.".into())
        })?;

        if info.aud != client_id {
            return Err(AppError::Unauthorized(
                "Google credential was issued for another application".into(),
            ));
        }

        let email_verified = info.email_verified();
        let email = info
            .email
            .ok_or_else(|| AppError::Validation("Google account has no email address.".into()))?;

        Ok(FederatedIdentity {
            subject: info.sub,
            email,
            email_verified,
            given_name: info.given_name,
            family_name: info.family_name,
            picture: info.picture,
        })
    }
}
