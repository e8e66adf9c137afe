//! Error types for each stage of the harness flow.
//!
//! Every fatal stage has its own error enum. Network-level failures are a
//! variant of the stage they happened in rather than a separate category, and
//! status/body pairs are kept verbatim so the operator can see exactly what
//! the gateway returned.

/// Errors from Dynamic Client Registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Gateway answered with something other than 200/201.
    #[error("Client registration failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// Gateway accepted the request but the body lacks `client_id` or `client_secret`.
    #[error("Registration response ({status}) is missing client_id or client_secret: {body}")]
    MissingCredentials { status: u16, body: String },

    /// Network/HTTP error.
    #[error("Network error during registration: {0}")]
    Network(String),
}

impl From<reqwest::Error> for RegistrationError {
    fn from(e: reqwest::Error) -> Self {
        RegistrationError::Network(network_message(&e))
    }
}

/// reqwest's `Display` omits the cause, so timeouts are named explicitly.
fn network_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else {
        e.to_string()
    }
}

/// Errors from the authorization stage.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    /// The provider redirected back with an `error` parameter.
    #[error("Authorization denied by provider: {error}{}", describe(.description))]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// The callback `state` does not match the one sent with the request.
    #[error("State mismatch: callback state does not match the authorization request")]
    StateMismatch,

    /// The redirect URI is not one of the URIs the client registered.
    #[error("Redirect URI is not registered for this client: {0}")]
    UnregisteredRedirectUri(String),

    /// The authorization endpoint could not be used to build a URL.
    #[error("Invalid authorization endpoint: {0}")]
    InvalidEndpoint(String),

    /// A pasted callback URL had no `code` parameter.
    #[error("Pasted callback URL has no authorization code: {0}")]
    MissingCode(String),

    /// Reading the manually entered code failed.
    #[error("Failed to read authorization code: {0}")]
    Prompt(String),
}

fn describe(description: &Option<String>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!(" ({})", d),
        _ => String::new(),
    }
}

/// Errors from the token exchange.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Token endpoint answered with something other than 200.
    #[error("Token exchange failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// 200 response without an `access_token` field.
    #[error("Token response has no access_token: {body}")]
    MissingAccessToken { body: String },

    /// Network/HTTP error.
    #[error("Network error during token exchange: {0}")]
    Network(String),
}

impl TokenError {
    /// HTTP status the token endpoint answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TokenError::Status { status, .. } => Some(*status),
            TokenError::MissingAccessToken { .. } => Some(200),
            TokenError::Network(_) => None,
        }
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(e: reqwest::Error) -> Self {
        TokenError::Network(network_message(&e))
    }
}

/// Any fatal failure of a full harness run.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, FlowError>;
