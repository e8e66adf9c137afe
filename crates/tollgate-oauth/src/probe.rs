//! Probes against the protected proxy: hybrid-auth checks and a health check.

use std::fmt;
use std::time::Duration;

use serde_json::json;

/// Model used by the fixed probe request.
pub const PROBE_MODEL: &str = "claude-3-haiku-20240307";

/// `anthropic-version` header value sent with probes.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Which credential a probe presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    OAuthToken,
    ApiKey,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::OAuthToken => write!(f, "OAuth token"),
            CredentialKind::ApiKey => write!(f, "API key"),
        }
    }
}

/// Outcome of one probe. Failures are data, not errors.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub kind: CredentialKind,
    pub success: bool,
    /// HTTP status, if the target answered.
    pub status: Option<u16>,
    /// Response body, verbatim.
    pub body: Option<String>,
    /// Transport error, if the request never got a response.
    pub error: Option<String>,
}

/// Target health as seen from `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unexpected(u16),
    Unreachable(String),
}

/// Sends the fixed chat request with a bearer credential.
#[derive(Debug, Clone)]
pub struct ProbeRunner {
    http: reqwest::Client,
    health_timeout: Duration,
}

impl ProbeRunner {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            health_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// `POST {target}/v1/messages` with `credential` as a bearer token.
    pub async fn probe(
        &self,
        target_url: &str,
        credential: &str,
        kind: CredentialKind,
    ) -> ProbeResult {
        let url = format!("{}/v1/messages", target_url.trim_end_matches('/'));
        let payload = json!({
            "model": PROBE_MODEL,
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": "Say hello in one word"}
            ]
        });

        tracing::debug!(%url, %kind, "Probing protected resource");

        let response = self
            .http
            .post(&url)
            .bearer_auth(credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "Probe request failed");
                return ProbeResult {
                    kind,
                    success: false,
                    status: None,
                    body: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let status = response.status().as_u16();
        let (body, error) = match response.text().await {
            Ok(body) => (Some(body), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let success = status == 200;
        tracing::info!(%kind, status, success, "Probe finished");

        ProbeResult {
            kind,
            success,
            status: Some(status),
            body,
            error,
        }
    }

    /// `GET {target}/health`. Never fails; the flow continues regardless.
    pub async fn health(&self, target_url: &str) -> HealthStatus {
        let url = format!("{}/health", target_url.trim_end_matches('/'));
        match self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().as_u16() == 200 => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Unexpected(response.status().as_u16()),
            Err(e) => HealthStatus::Unreachable(e.to_string()),
        }
    }
}
