//! Bearer-token authentication for protected servers.
//!
//! # Design
//! - The token cache is owned by the authenticator, not process-global.
//! - The cache lock is held across check-and-refresh so concurrent workers
//!   trigger at most one token request.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use indy_harness_config::KeycloakSettings;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};

const REFRESH_MARGIN_SECS: i64 = 30;

/// Supplies the `Authorization` header value for outgoing requests.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Header value, e.g. `Bearer <token>`.
    async fn authorization(&self, client: &Client) -> HarnessResult<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Client-credentials authenticator against a Keycloak realm.
#[derive(Debug)]
pub struct KeycloakAuthenticator {
    settings: KeycloakSettings,
    cache: Mutex<Option<CachedToken>>,
}

impl KeycloakAuthenticator {
    /// Authenticator with an empty cache.
    #[must_use]
    pub fn new(settings: KeycloakSettings) -> Self {
        Self {
            settings,
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self, client: &Client) -> HarnessResult<CachedToken> {
        let url = self.settings.token_url();
        let auth_error = |reason: String| HarnessError::Auth {
            url: url.clone(),
            reason,
        };
        let response = client
            .post(&url)
            .basic_auth(
                &self.settings.client_id,
                Some(&self.settings.client_credential),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|err| auth_error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(auth_error(format!("token endpoint returned {status}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| auth_error(format!("malformed token response: {err}")))?;
        info!(realm = %self.settings.realm, expires_in = token.expires_in, "obtained access token");
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl Authenticator for KeycloakAuthenticator {
    async fn authorization(&self, client: &Client) -> HarnessResult<String> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            debug!("reusing cached access token");
            return Ok(format!("Bearer {}", token.value));
        }
        let token = self.fetch(client).await?;
        let header = format!("Bearer {}", token.value);
        *cache = Some(token);
        Ok(header)
    }
}
