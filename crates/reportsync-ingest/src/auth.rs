//! Access tokens for the reporting API
//!
//! Long-running syncs authenticate with a service-account key file. The key
//! is exchanged for short-lived OAuth tokens that are cached and renewed
//! shortly before they expire. A static bearer token is still accepted for
//! local runs.

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ConnectorConfig;
use crate::error::SourceError;

/// Read-only access to reporting views
pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// Hands out a bearer token for each request
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, SourceError>;
}

/// A fixed token, typically from `REPORTSYNC_ACCESS_TOKEN`
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Result<Self, SourceError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SourceError::Init(
                "no credentials: set REPORTSYNC_CREDENTIALS_FILE or REPORTSYNC_ACCESS_TOKEN"
                    .to_string(),
            ));
        }
        Ok(Self(token))
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, SourceError> {
        Ok(self.0.clone())
    }
}

/// Tokens minted from a service-account key file
pub struct ServiceAccountToken {
    account: CustomServiceAccount,
}

impl ServiceAccountToken {
    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let account = CustomServiceAccount::from_file(path).map_err(|e| {
            SourceError::Init(format!(
                "failed to load service account key {}: {}",
                path.display(),
                e
            ))
        })?;

        info!(path = %path.display(), "Loaded service account credentials");
        Ok(Self { account })
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountToken {
    async fn access_token(&self) -> Result<String, SourceError> {
        // gcp_auth caches per scope set and only calls the token endpoint
        // once the cached token is about to expire
        let token = self
            .account
            .token(&[ANALYTICS_READONLY_SCOPE])
            .await
            .map_err(|e| SourceError::Token(e.to_string()))?;

        debug!("Using service account token");
        Ok(token.as_str().to_string())
    }
}

/// Pick the credential source named by the configuration
///
/// A key file wins; `validate()` rejects configurations that set both.
pub fn provider_from_config(
    config: &ConnectorConfig,
) -> Result<Arc<dyn AccessTokenProvider>, SourceError> {
    match &config.credentials_file {
        Some(path) => Ok(Arc::new(ServiceAccountToken::from_file(path)?)),
        None => Ok(Arc::new(StaticToken::new(config.access_token.clone())?)),
    }
}
