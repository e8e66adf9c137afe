//! Authorization-code redemption at the token endpoint.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::TokenError;

/// Tokens returned from the exchange.
///
/// `expires_in` is informational; nothing here refreshes. `refresh_token` is
/// captured when present and otherwise unused.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    /// When the harness received the response.
    pub obtained_at: DateTime<Utc>,
}

impl TokenResponse {
    /// Read a token response body.
    ///
    /// Only a non-empty string `access_token` is required. Other fields are
    /// kept when they have a usable shape and dropped otherwise.
    pub fn from_json(value: &Value) -> Option<Self> {
        let access_token = value
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())?
            .to_string();

        Some(Self {
            access_token,
            token_type: string_field(value, "token_type"),
            expires_in: value.get("expires_in").and_then(lenient_seconds),
            refresh_token: string_field(value, "refresh_token"),
            scope: string_field(value, "scope"),
            obtained_at: Utc::now(),
        })
    }

    /// Informational expiry instant, if the server sent `expires_in`.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        self.obtained_at.checked_add_signed(Duration::try_seconds(secs)?)
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts `3600`, `3600.0` and `"3600"`.
fn lenient_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        }
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    code_verifier: &'a str,
}

/// Redeems authorization codes. One attempt, no retries.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    http: reqwest::Client,
}

impl TokenExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `redirect_uri` must be byte-identical to the one used in the
    /// authorization request; the server is expected to enforce that.
    pub async fn exchange(
        &self,
        token_endpoint: &str,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<TokenResponse, TokenError> {
        let request = TokenExchangeRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri,
            client_id,
            client_secret,
            code_verifier: verifier,
        };

        tracing::debug!(url = %token_endpoint, "Exchanging authorization code");

        let response = self
            .http
            .post(token_endpoint)
            .form(&request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if status != 200 {
            return Err(TokenError::Status { status, body });
        }

        let parsed = serde_json::from_str::<Value>(&body).ok();
        let Some(tokens) = parsed.as_ref().and_then(TokenResponse::from_json) else {
            return Err(TokenError::MissingAccessToken { body });
        };

        tracing::info!(
            token_type = ?tokens.token_type,
            expires_in = ?tokens.expires_in,
            has_refresh_token = tokens.refresh_token.is_some(),
            "Token exchange successful"
        );
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_parse() {
        let tokens = TokenResponse::from_json(
            &json!({"access_token": "tok123", "token_type": "Bearer", "expires_in": 3600}),
        )
        .unwrap();
        assert_eq!(tokens.access_token, "tok123");
        assert_eq!(tokens.token_type.as_deref(), Some("Bearer"));
        assert!(tokens.refresh_token.is_none());

        let expires_at = tokens.expires_at().unwrap();
        assert_eq!((expires_at - tokens.obtained_at).num_seconds(), 3600);
    }

    #[test]
    fn test_token_response_requires_access_token() {
        assert!(TokenResponse::from_json(&json!({"token_type": "Bearer"})).is_none());
        assert!(TokenResponse::from_json(&json!({"access_token": ""})).is_none());
        assert!(TokenResponse::from_json(&json!({"access_token": 42})).is_none());
        assert!(TokenResponse::from_json(&json!(["tok123"])).is_none());
    }

    #[test]
    fn test_optional_fields_are_lenient() {
        let tokens = TokenResponse::from_json(&json!({
            "access_token": "tok123",
            "token_type": null,
            "expires_in": "3600",
            "refresh_token": 7
        }))
        .unwrap();
        assert!(tokens.token_type.is_none());
        assert_eq!(tokens.expires_in, Some(3600));
        assert!(tokens.refresh_token.is_none());

        let tokens =
            TokenResponse::from_json(&json!({"access_token": "tok123", "expires_in": 59.9}))
                .unwrap();
        assert_eq!(tokens.expires_in, Some(59));

        let tokens =
            TokenResponse::from_json(&json!({"access_token": "tok123", "expires_in": "soon"}))
                .unwrap();
        assert!(tokens.expires_in.is_none());
    }
}
