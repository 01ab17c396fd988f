//! Liveness check used by the `scribe healthcheck` subcommand.
//!
//! The container image has no shell or curl, so the binary checks its own
//! `/health` endpoint on loopback and exits non-zero when it is unhealthy.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Port checked when `SCRIBE_PORT` is unset or unparsable.
const DEFAULT_HTTP_PORT: u16 = 8080;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HealthcheckError {
    #[error("healthcheck client could not be built: {0}")]
    Client(#[source] reqwest::Error),

    #[error("scribe at {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("scribe at {url} answered {status}")]
    Unhealthy { url: String, status: u16 },

    #[error("scribe at {url} returned an unexpected health body: {detail}")]
    UnexpectedBody { url: String, detail: String },
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// Checks the port named by `SCRIBE_PORT`.
pub async fn healthcheck() -> Result<(), HealthcheckError> {
    healthcheck_with_port(port_from_env_value(std::env::var("SCRIBE_PORT").ok().as_deref())).await
}

fn port_from_env_value(raw: Option<&str>) -> u16 {
    raw.and_then(|p| p.trim().parse().ok())
        .filter(|&p| p != 0)
        .unwrap_or(DEFAULT_HTTP_PORT)
}

/// Succeeds only on a 2xx answer whose body reports `"status": "ok"`.
pub async fn healthcheck_with_port(port: u16) -> Result<(), HealthcheckError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(HealthcheckError::Client)?;
    let url = format!("http://127.0.0.1:{port}/health");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| HealthcheckError::Unreachable {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(HealthcheckError::Unhealthy {
            url,
            status: status.as_u16(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|source| HealthcheckError::Unreachable {
            url: url.clone(),
            source,
        })?;
    match serde_json::from_slice::<HealthBody>(&bytes) {
        Ok(body) if body.status == "ok" => Ok(()),
        Ok(body) => Err(HealthcheckError::UnexpectedBody {
            url,
            detail: format!("status {:?}", body.status),
        }),
        Err(e) => Err(HealthcheckError::UnexpectedBody {
            url,
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_from_env_value_falls_back_to_default() {
        assert_eq!(port_from_env_value(None), DEFAULT_HTTP_PORT);
        assert_eq!(port_from_env_value(Some("not-a-port")), DEFAULT_HTTP_PORT);
        assert_eq!(port_from_env_value(Some("0")), DEFAULT_HTTP_PORT);
        assert_eq!(port_from_env_value(Some(" 9090 ")), 9090);
    }
}
