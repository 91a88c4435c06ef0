//! Shared client construction, error types, and record loading for the CLI.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indy_harness_config::{CacheLayout, ConfigError, EnvironmentSettings};
use indy_harness_core::auth::{Authenticator, KeycloakAuthenticator};
use indy_harness_core::folo::{fetch_record, load_record};
use indy_harness_core::{HarnessError, IndyClient, TrackedContent, validate_server};
use tracing::info;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Failure(_) => 1,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<HarnessError> for CliError {
    fn from(error: HarnessError) -> Self {
        let detail = error.detail();
        match error {
            HarnessError::InvalidServer { .. } => {
                Self::Validation(format!("invalid indy server: {detail}"))
            }
            other => Self::Failure(anyhow::Error::new(other).context(detail)),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        Self::Validation(format!("{error}: {}", error.detail()))
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) client: IndyClient,
    pub(crate) cache: CacheLayout,
}

impl AppContext {
    /// Build the HTTP client, attaching the token authenticator when the
    /// environment configures one.
    pub(crate) fn from_settings(
        settings: &EnvironmentSettings,
        timeout: Duration,
    ) -> CliResult<Self> {
        let auth = settings.keycloak.clone().map(|keycloak| {
            info!(
                server = %keycloak.server_url,
                realm = %keycloak.realm,
                "using bearer token authentication"
            );
            Arc::new(KeycloakAuthenticator::new(keycloak)) as Arc<dyn Authenticator>
        });
        Ok(Self {
            client: IndyClient::new(timeout, auth)?,
            cache: CacheLayout::from_settings(settings),
        })
    }
}

/// Reject empty positional values before any network call.
pub(crate) fn require(name: &str, value: &str) -> CliResult<()> {
    if value.trim().is_empty() {
        return Err(CliError::validation(format!("{name} must not be empty")));
    }
    Ok(())
}

/// Load a tracking record from `file`, or fetch record `tracking_id` from the
/// `original` server.
pub(crate) async fn tracking_record(
    ctx: &AppContext,
    original: &str,
    tracking_id: &str,
    file: Option<&Path>,
) -> CliResult<TrackedContent> {
    if let Some(file) = file {
        return Ok(load_record(file).await?);
    }
    require("tracking id", tracking_id)?;
    let server = validate_server(&ctx.client, original).await?;
    Ok(fetch_record(&ctx.client, &server.base_url, tracking_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::prelude::*;
    use indy_harness_config::KeycloakSettings;

    #[test]
    fn every_error_exits_with_one() {
        assert_eq!(CliError::validation("bad").exit_code(), 1);
        assert_eq!(CliError::failure(anyhow::anyhow!("boom")).exit_code(), 1);
        assert_eq!(CliError::validation("bad").display_message(), "bad");
    }

    #[test]
    fn harness_errors_keep_their_detail() {
        let err = CliError::from(HarnessError::BatchFailed {
            batch: "uploads",
            failed: 2,
            attempted: 5,
        });
        assert!(matches!(err, CliError::Failure(_)));
        assert!(err.display_message().contains("uploads"));

        let err = CliError::from(HarnessError::InvalidServer {
            address: "bad host".into(),
            reason: "unreachable".into(),
        });
        assert!(matches!(err, CliError::Validation(_)));
        assert!(err.display_message().contains("bad host"));
    }

    #[test]
    fn context_honours_environment_settings() -> Result<()> {
        let settings = EnvironmentSettings {
            test_mount_path: Some("/mnt/cache".into()),
            keycloak: Some(KeycloakSettings {
                server_url: "http://sso".into(),
                realm: "realm".into(),
                client_id: "id".into(),
                client_credential: "secret".into(),
            }),
        };
        let ctx = AppContext::from_settings(&settings, Duration::from_secs(5))
            .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert!(ctx.cache.per_record);
        assert_eq!(ctx.cache.upload_dir("build-1"), Path::new("/mnt/cache/build-1/upload"));
        Ok(())
    }

    #[test]
    fn empty_values_are_rejected() {
        assert!(require("tracking id", "build-1").is_ok());
        assert!(matches!(require("tracking id", "  "), Err(CliError::Validation(_))));
    }

    #[tokio::test]
    async fn record_is_fetched_from_the_original_server() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/admin/stores/maven/remote/central");
            then.status(200);
        });
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/folo/admin/build-1/record");
            then.status(200).body(r#"{"key":{"id":"build-1"},"uploads":[],"downloads":[]}"#);
        });
        let ctx = AppContext::from_settings(&EnvironmentSettings::default(), Duration::from_secs(5))
            .map_err(|err| anyhow::anyhow!(err.display_message()))?;

        let record = tracking_record(&ctx, &server.base_url(), "build-1", None)
            .await
            .map_err(|err| anyhow::anyhow!(err.display_message()))?;

        assert_eq!(record.tracking_key.id, "build-1");
        mock.assert();
        Ok(())
    }
}
