//! Bearer tokens for the compute API.

use super::metadata::MetadataSource;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Refresh this long before the metadata server says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const TOKEN_PATH: &str = "instance/service-accounts/default/token";

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, ApiError>;
}

/// A fixed token, e.g. from `GCE_ACCESS_TOKEN`.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Tokens of the instance's default service account, cached until shortly
/// before they expire.
pub struct MetadataTokenSource {
    metadata: Arc<dyn MetadataSource>,
    cached: Mutex<Option<(String, Instant)>>,
}

impl MetadataTokenSource {
    pub fn new(metadata: Arc<dyn MetadataSource>) -> MetadataTokenSource {
        MetadataTokenSource {
            metadata,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, refresh_at)) = cached.as_ref() {
            if Instant::now() < *refresh_at {
                return Ok(token.clone());
            }
        }

        let body = self
            .metadata
            .get(&format!("{TOKEN_PATH}?scopes={}", crate::config::COMPUTE_SCOPE))
            .await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Metadata(format!("error parsing token response: {e}")))?;
        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(EXPIRY_MARGIN);
        log::debug!("fetched access token, valid for {}s", lifetime.as_secs());
        *cached = Some((parsed.access_token.clone(), Instant::now() + lifetime));
        Ok(parsed.access_token)
    }
}
