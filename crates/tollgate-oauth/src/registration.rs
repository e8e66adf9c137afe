//! Dynamic Client Registration against the gateway's OAuth-proxy API.

use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// Build `{gateway}/api/v1/oauth-proxy/{proxy_id}/{endpoint}`.
pub fn oauth_proxy_url(gateway_url: &str, proxy_id: u64, endpoint: &str) -> String {
    format!(
        "{}/api/v1/oauth-proxy/{}/{}",
        gateway_url.trim_end_matches('/'),
        proxy_id,
        endpoint
    )
}

/// Credentials and endpoints of a freshly registered client.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    /// Never empty.
    pub redirect_uris: Vec<String>,
}

impl ClientRegistration {
    /// Whether `uri` is byte-identical to one of the registered URIs.
    pub fn is_registered(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    redirect_uris: &'a [String],
    client_name: &'a str,
    token_endpoint_auth_method: &'static str,
    grant_types: [&'static str; 2],
    response_types: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistrationResponse {
    client_id: Option<String>,
    client_secret: Option<String>,
    authorization_url: Option<String>,
    token_url: Option<String>,
    redirect_uris: Option<Vec<String>>,
}

/// Performs Dynamic Client Registration. One attempt, no retries.
#[derive(Debug, Clone)]
pub struct ClientRegistrar {
    http: reqwest::Client,
}

impl ClientRegistrar {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Register a client for `proxy_id`.
    ///
    /// `scope` is only sent when it is non-blank; leaving it out asks the
    /// provider for its defaults.
    pub async fn register(
        &self,
        gateway_url: &str,
        proxy_id: u64,
        redirect_uris: &[String],
        client_name: &str,
        scope: Option<&str>,
    ) -> Result<ClientRegistration, RegistrationError> {
        let url = oauth_proxy_url(gateway_url, proxy_id, "register");
        let request = RegistrationRequest {
            redirect_uris,
            client_name,
            token_endpoint_auth_method: "client_secret_post",
            grant_types: ["authorization_code", "refresh_token"],
            response_types: ["code"],
            scope: scope.map(str::trim).filter(|s| !s.is_empty()),
        };

        tracing::debug!(%url, ?redirect_uris, "Registering OAuth client");

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if status != 200 && status != 201 {
            return Err(RegistrationError::Status { status, body });
        }

        let parsed: RegistrationResponse = serde_json::from_str(&body).unwrap_or_default();
        let (Some(client_id), Some(client_secret)) = (
            parsed.client_id.filter(|s| !s.is_empty()),
            parsed.client_secret.filter(|s| !s.is_empty()),
        ) else {
            return Err(RegistrationError::MissingCredentials { status, body });
        };

        let redirect_uris = parsed
            .redirect_uris
            .filter(|uris| !uris.is_empty())
            .unwrap_or_else(|| redirect_uris.to_vec());

        tracing::info!(%client_id, status, "Client registered");

        Ok(ClientRegistration {
            client_id,
            client_secret,
            authorization_endpoint: parsed
                .authorization_url
                .unwrap_or_else(|| oauth_proxy_url(gateway_url, proxy_id, "authorize")),
            token_endpoint: parsed
                .token_url
                .unwrap_or_else(|| oauth_proxy_url(gateway_url, proxy_id, "token")),
            redirect_uris,
        })
    }
}
