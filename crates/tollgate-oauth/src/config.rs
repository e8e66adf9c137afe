//! Configuration for a harness run.

use std::time::Duration;

/// Default gateway API base URL.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";

/// Redirect URI served by the local callback listener.
pub const DEFAULT_CALLBACK_URI: &str = "http://localhost:8888/callback";

/// Extra custom-scheme URI registered alongside the local callback, the way
/// desktop MCP clients register.
pub const DEFAULT_APP_REDIRECT_URI: &str = "cursor://oauth-callback";

/// Client name sent with Dynamic Client Registration.
pub const DEFAULT_CLIENT_NAME: &str = "Tollgate Test Client";

/// Timeouts for the synchronous HTTP stages.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout for registration, token exchange and probes.
    pub request_timeout: Duration,
    /// Timeout for the target health check.
    pub health_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpConfig {
    /// Build a reqwest client honoring the request timeout.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    error = %e,
                    timeout = ?self.request_timeout,
                    "Failed to build HTTP client, using defaults without a request timeout"
                );
                reqwest::Client::new()
            })
    }
}

/// Settings for the interactive authorization stage.
#[derive(Debug, Clone)]
pub struct AuthorizeConfig {
    /// How long to wait for the browser redirect before asking for the code.
    pub callback_timeout: Duration,
    /// How often the waiting side checks the callback slot.
    pub poll_interval: Duration,
}

impl Default for AuthorizeConfig {
    fn default() -> Self {
        Self {
            callback_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl AuthorizeConfig {
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Everything a full harness run needs.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Gateway API base URL (hosts the OAuth-proxy endpoints).
    pub gateway_url: String,
    /// Proxy whose OAuth-proxy endpoints are under test.
    pub proxy_id: u64,
    /// Base URL of the protected proxy probed after authentication.
    pub target_url: String,
    /// Static API key for the hybrid-auth probe.
    pub api_key: Option<String>,
    /// Space-separated scopes. `None` means provider defaults.
    pub scope: Option<String>,
    /// URIs to register. The first one is used for authorization.
    pub redirect_uris: Vec<String>,
    pub client_name: String,
    pub http: HttpConfig,
    pub authorize: AuthorizeConfig,
}

impl HarnessConfig {
    /// Create a config with defaults for everything but the target and proxy.
    pub fn new(target_url: impl Into<String>, proxy_id: u64) -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            proxy_id,
            target_url: target_url.into(),
            api_key: None,
            scope: None,
            redirect_uris: vec![
                DEFAULT_CALLBACK_URI.to_string(),
                DEFAULT_APP_REDIRECT_URI.to_string(),
            ],
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            http: HttpConfig::default(),
            authorize: AuthorizeConfig::default(),
        }
    }

    pub fn with_gateway(mut self, gateway_url: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self
    }

    /// Set the API key; blank keys count as absent.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Set the scope; blank scopes count as "use provider defaults".
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    /// Replace the registered redirect URIs. An empty list keeps the defaults.
    pub fn with_redirect_uris(mut self, uris: Vec<String>) -> Self {
        if !uris.is_empty() {
            self.redirect_uris = uris;
        }
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_authorize(mut self, authorize: AuthorizeConfig) -> Self {
        self.authorize = authorize;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::new("http://localhost:8093", 9);
        assert_eq!(config.gateway_url, "http://localhost:8080");
        assert_eq!(config.redirect_uris[0], "http://localhost:8888/callback");
        assert_eq!(config.authorize.callback_timeout, Duration::from_secs(300));
        assert_eq!(config.authorize.poll_interval, Duration::from_millis(500));
        assert!(config.scope.is_none());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_blank_values_are_absent() {
        let config = HarnessConfig::new("http://t", 1)
            .with_scope(Some("   ".to_string()))
            .with_api_key(Some(String::new()));
        assert!(config.scope.is_none());
        assert!(config.api_key.is_none());

        let config = config.with_scope(Some(" openid profile ".to_string()));
        assert_eq!(config.scope.as_deref(), Some("openid profile"));
    }

    #[test]
    fn test_empty_redirect_uris_keep_defaults() {
        let config = HarnessConfig::new("http://t", 1).with_redirect_uris(vec![]);
        assert_eq!(config.redirect_uris.len(), 2);
    }
}
