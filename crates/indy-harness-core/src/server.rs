//! Server address handling and liveness validation.

use tracing::{error, info};
use url::Url;

use crate::error::{HarnessError, HarnessResult};
use crate::http::IndyClient;

const VALIDATION_PATH: &str = "/api/admin/stores/maven/remote/central";

/// A validated server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndyServer {
    /// `host[:port]`, without the default port.
    pub host: String,
    /// `scheme://host[:port]`, without trailing slash.
    pub base_url: String,
}

/// Reduce an operator-supplied address to host and base URL.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidServer`] when no host can be extracted.
pub fn parse_server(raw: &str) -> HarnessResult<IndyServer> {
    let invalid = |reason: &str| HarnessError::InvalidServer {
        address: raw.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let url = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let host = match url.port() {
            Some(port) if port != 80 => format!("{host}:{port}"),
            _ => host.to_string(),
        };
        let base_url = format!("{}://{host}", url.scheme());
        return Ok(IndyServer { host, base_url });
    }

    let host = trimmed.split('/').next().unwrap_or_default();
    let host = host.strip_suffix(":80").unwrap_or(host);
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok(IndyServer {
        host: host.to_string(),
        base_url: format!("http://{host}"),
    })
}

/// Parse `raw` and confirm the server answers the store listing request.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidServer`] for unparsable addresses, transport
/// failures and statuses outside `200..400`.
pub async fn validate_server(client: &IndyClient, raw: &str) -> HarnessResult<IndyServer> {
    let server = parse_server(raw)?;
    let url = format!("{}{VALIDATION_PATH}", server.base_url);
    info!(server = %server.host, "validating indy server");
    let response = client.get(&url).await;
    if (200..400).contains(&response.status) {
        return Ok(server);
    }
    error!(server = %raw, url = %url, status = response.status, "not a valid indy server");
    Err(HarnessError::InvalidServer {
        address: raw.to_string(),
        reason: format!("store listing {url} returned status {}", response.status),
    })
}
