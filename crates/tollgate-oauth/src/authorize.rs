//! Authorization stage: build the URL, wait for the redirect, fall back to
//! manual entry.
//!
//! Phases follow
//! `NotStarted → UrlBuilt → ListenerArmed → WaitingForCallback →
//! {CodeReceived | CallbackFailed | CallbackTimedOut → ManualEntry →
//! {CodeReceived | Skipped}}`. A listener that cannot bind skips straight
//! from `UrlBuilt` to `ManualEntry`.

use std::sync::Arc;

use tokio::time::{Instant, sleep};

use crate::callback::{CallbackListener, CallbackResult, CallbackSlot};
use crate::config::AuthorizeConfig;
use crate::error::AuthorizationError;
use crate::interact::{CodePrompt, SystemBrowser, UserAgent};
use crate::pkce::{PkceParameters, generate_state};

/// Where in the authorization state machine a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationPhase {
    NotStarted,
    UrlBuilt,
    ListenerArmed,
    WaitingForCallback,
    CallbackTimedOut,
    ManualEntry,
    CodeReceived,
    CallbackFailed,
    Skipped,
}

impl AuthorizationPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CodeReceived | Self::CallbackFailed | Self::Skipped
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use AuthorizationPhase::*;
        matches!(
            (self, next),
            (NotStarted, UrlBuilt)
                | (UrlBuilt, ListenerArmed)
                | (UrlBuilt, ManualEntry)
                | (ListenerArmed, WaitingForCallback)
                | (WaitingForCallback, CodeReceived)
                | (WaitingForCallback, CallbackFailed)
                | (WaitingForCallback, CallbackTimedOut)
                | (CallbackTimedOut, ManualEntry)
                | (ManualEntry, CodeReceived)
                | (ManualEntry, CallbackFailed)
                | (ManualEntry, Skipped)
        )
    }
}

#[derive(Debug)]
struct PhaseLog {
    current: AuthorizationPhase,
}

impl PhaseLog {
    fn new() -> Self {
        Self {
            current: AuthorizationPhase::NotStarted,
        }
    }

    fn advance(&mut self, next: AuthorizationPhase) {
        debug_assert!(
            self.current.can_transition_to(next),
            "illegal authorization transition {:?} -> {:?}",
            self.current,
            next
        );
        tracing::debug!(from = ?self.current, to = ?next, "Authorization phase");
        self.current = next;
    }
}

/// CSRF `state` bound to the redirect URI of one authorization request.
///
/// Verification consumes it, so a state can only ever be checked once.
#[derive(Debug)]
pub struct AuthorizationState {
    state: String,
    redirect_uri: String,
}

impl AuthorizationState {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            state: generate_state(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Check the state echoed back by the provider. Returns the redirect URI on match.
    pub fn verify(self, received: &str) -> Result<String, AuthorizationError> {
        if received != self.state {
            return Err(AuthorizationError::StateMismatch);
        }
        Ok(self.redirect_uri)
    }

    /// Consume without a state check (operator pasted a bare code).
    fn into_redirect_uri(self) -> String {
        self.redirect_uri
    }
}

/// How the code reached the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    Callback,
    Manual,
}

/// An authorization code plus the redirect URI it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    /// Exactly the URI sent in the authorization request.
    pub redirect_uri: String,
    pub source: CodeSource,
}

/// Result of the authorization stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Code(AuthorizationCode),
    /// The operator declined to enter a code. Terminal, not an error.
    Skipped,
}

/// Build the authorization URL for the OAuth flow.
pub fn build_authorization_url(
    endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    pkce: &PkceParameters,
    state: &str,
    scope: Option<&str>,
) -> Result<String, AuthorizationError> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|e| AuthorizationError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    let mut params = vec![
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("state", state),
        ("code_challenge", pkce.challenge()),
        ("code_challenge_method", pkce.method()),
    ];
    if let Some(scope) = scope.map(str::trim).filter(|s| !s.is_empty()) {
        params.push(("scope", scope));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if parsed.query().is_some() { '&' } else { '?' };
    Ok(format!("{}{}{}", endpoint, separator, query))
}

/// What the operator typed at the manual prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualEntry {
    Empty,
    Code {
        code: String,
        state: Option<String>,
    },
    Error {
        error: String,
        description: Option<String>,
    },
    /// A URL that carries neither `code` nor `error`.
    MissingCode(String),
}

/// Accept either a bare code or the full callback URL copied from the browser.
pub fn parse_manual_entry(input: &str) -> ManualEntry {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return ManualEntry::Empty;
    }

    if let Ok(url) = url::Url::parse(trimmed)
        && url.has_host()
    {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }
        if let Some(error) = error {
            return ManualEntry::Error { error, description };
        }
        return match code.filter(|c| !c.is_empty()) {
            Some(code) => ManualEntry::Code { code, state },
            None => ManualEntry::MissingCode(trimmed.to_string()),
        };
    }

    ManualEntry::Code {
        code: trimmed.to_string(),
        state: None,
    }
}

/// Drives one authorization attempt.
#[derive(Debug, Clone)]
pub struct Authorizer {
    config: AuthorizeConfig,
    user_agent: Arc<dyn UserAgent>,
    prompt: Arc<dyn CodePrompt>,
}

impl Authorizer {
    pub fn new(prompt: Arc<dyn CodePrompt>) -> Self {
        Self {
            config: AuthorizeConfig::default(),
            user_agent: Arc::new(SystemBrowser),
            prompt,
        }
    }

    pub fn with_config(mut self, config: AuthorizeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Arc<dyn UserAgent>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Run the authorization stage against `endpoint`.
    pub async fn authorize(
        &self,
        endpoint: &str,
        client_id: &str,
        redirect_uri: &str,
        pkce: &PkceParameters,
        scope: Option<&str>,
    ) -> Result<AuthorizationOutcome, AuthorizationError> {
        let mut phases = PhaseLog::new();
        let auth_state = AuthorizationState::new(redirect_uri);
        let url = build_authorization_url(
            endpoint,
            client_id,
            redirect_uri,
            pkce,
            auth_state.state(),
            scope,
        )?;
        phases.advance(AuthorizationPhase::UrlBuilt);
        tracing::debug!(%url, "Authorization URL built");

        let slot = CallbackSlot::new();
        let mut listener =
            match CallbackListener::for_redirect_uri(redirect_uri, slot.clone()).await {
                Ok(listener) => {
                    phases.advance(AuthorizationPhase::ListenerArmed);
                    tracing::info!(addr = %listener.local_addr(), "Callback listener armed");
                    Some(listener)
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        %redirect_uri,
                        "Callback listener unavailable, falling back to manual entry"
                    );
                    None
                }
            };

        if let Err(e) = self.user_agent.open(&url).await {
            tracing::warn!(error = %e, "Could not open the authorization URL automatically");
        }

        let result = match listener.as_mut() {
            Some(listener) => {
                phases.advance(AuthorizationPhase::WaitingForCallback);
                let result = self.wait_for_callback(&slot).await;
                listener.shutdown().await;
                if matches!(result, CallbackResult::Timeout) {
                    phases.advance(AuthorizationPhase::CallbackTimedOut);
                }
                result
            }
            None => CallbackResult::Timeout,
        };

        match result {
            CallbackResult::Success { code, state } => match auth_state.verify(&state) {
                Ok(redirect_uri) => {
                    phases.advance(AuthorizationPhase::CodeReceived);
                    Ok(AuthorizationOutcome::Code(AuthorizationCode {
                        code,
                        redirect_uri,
                        source: CodeSource::Callback,
                    }))
                }
                Err(e) => {
                    phases.advance(AuthorizationPhase::CallbackFailed);
                    Err(e)
                }
            },
            CallbackResult::Failure {
                error,
                error_description,
            } => {
                phases.advance(AuthorizationPhase::CallbackFailed);
                Err(AuthorizationError::Provider {
                    error,
                    description: error_description,
                })
            }
            CallbackResult::Timeout => {
                tracing::warn!("No callback received, asking for the code manually");
                phases.advance(AuthorizationPhase::ManualEntry);
                self.manual_entry(auth_state, &url, &mut phases).await
            }
        }
    }

    /// Poll the slot until it fills or the deadline passes.
    async fn wait_for_callback(&self, slot: &CallbackSlot) -> CallbackResult {
        let deadline = Instant::now() + self.config.callback_timeout;
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            let now = Instant::now();
            if now >= deadline {
                return CallbackResult::Timeout;
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn manual_entry(
        &self,
        auth_state: AuthorizationState,
        url: &str,
        phases: &mut PhaseLog,
    ) -> Result<AuthorizationOutcome, AuthorizationError> {
        let input = self
            .prompt
            .read_code(url)
            .await
            .map_err(|e| AuthorizationError::Prompt(e.to_string()))?;

        let verified = match parse_manual_entry(&input) {
            ManualEntry::Empty => {
                phases.advance(AuthorizationPhase::Skipped);
                return Ok(AuthorizationOutcome::Skipped);
            }
            ManualEntry::Error { error, description } => {
                Err(AuthorizationError::Provider { error, description })
            }
            ManualEntry::MissingCode(url) => Err(AuthorizationError::MissingCode(url)),
            ManualEntry::Code {
                code,
                state: Some(state),
            } => auth_state.verify(&state).map(|uri| (code, uri)),
            ManualEntry::Code { code, state: None } => Ok((code, auth_state.into_redirect_uri())),
        };

        match verified {
            Ok((code, redirect_uri)) => {
                phases.advance(AuthorizationPhase::CodeReceived);
                Ok(AuthorizationOutcome::Code(AuthorizationCode {
                    code,
                    redirect_uri,
                    source: CodeSource::Manual,
                }))
            }
            Err(e) => {
                phases.advance(AuthorizationPhase::CallbackFailed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_of(url: &str) -> std::collections::HashMap<String, String> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    #[test]
    fn test_authorization_url() {
        let pkce = PkceParameters::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        let url = build_authorization_url(
            "http://localhost:8080/api/v1/oauth-proxy/9/authorize",
            "client_abc",
            "http://localhost:8888/callback",
            &pkce,
            "test_state",
            Some("openid profile"),
        )
        .unwrap();

        assert!(url.starts_with("http://localhost:8080/api/v1/oauth-proxy/9/authorize?"));
        let query = query_of(&url);
        assert_eq!(query["client_id"], "client_abc");
        assert_eq!(query["redirect_uri"], "http://localhost:8888/callback");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["state"], "test_state");
        assert_eq!(query["code_challenge"], pkce.challenge());
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["scope"], "openid profile");
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8888%2Fcallback"));
    }

    #[test]
    fn test_authorization_url_without_scope() {
        let pkce = PkceParameters::generate();
        let url =
            build_authorization_url("http://gw/authorize", "c", "http://cb", &pkce, "s", Some(" "))
                .unwrap();
        assert!(!query_of(&url).contains_key("scope"));
    }

    #[test]
    fn test_authorization_url_appends_to_existing_query() {
        let pkce = PkceParameters::generate();
        let url = build_authorization_url(
            "http://gw/authorize?tenant=a",
            "c",
            "http://cb",
            &pkce,
            "s",
            None,
        )
        .unwrap();
        assert!(url.starts_with("http://gw/authorize?tenant=a&client_id=c"));
    }

    #[test]
    fn test_authorization_url_rejects_bad_endpoint() {
        let pkce = PkceParameters::generate();
        let err = build_authorization_url("not a url", "c", "http://cb", &pkce, "s", None)
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_state_verify() {
        let state = AuthorizationState::new("http://localhost:8888/callback");
        let value = state.state().to_string();
        assert_eq!(
            state.verify(&value).unwrap(),
            "http://localhost:8888/callback"
        );

        let state = AuthorizationState::new("http://localhost:8888/callback");
        assert!(matches!(
            state.verify("forged"),
            Err(AuthorizationError::StateMismatch)
        ));
    }

    #[test]
    fn test_states_are_fresh() {
        let a = AuthorizationState::new("http://cb");
        let b = AuthorizationState::new("http://cb");
        assert_ne!(a.state(), b.state());
    }

    #[test]
    fn test_parse_manual_entry() {
        assert_eq!(parse_manual_entry("   "), ManualEntry::Empty);
        assert_eq!(
            parse_manual_entry("  abc123  "),
            ManualEntry::Code {
                code: "abc123".into(),
                state: None
            }
        );
        assert_eq!(
            parse_manual_entry("http://localhost:8888/callback?code=abc&state=xyz"),
            ManualEntry::Code {
                code: "abc".into(),
                state: Some("xyz".into())
            }
        );
        assert_eq!(
            parse_manual_entry("http://localhost:8888/callback?error=access_denied"),
            ManualEntry::Error {
                error: "access_denied".into(),
                description: None
            }
        );
        assert_eq!(
            parse_manual_entry("http://localhost:8888/callback?state=x"),
            ManualEntry::MissingCode("http://localhost:8888/callback?state=x".into())
        );
        assert_eq!(
            parse_manual_entry("http://localhost:8888/callback"),
            ManualEntry::MissingCode("http://localhost:8888/callback".into())
        );
    }

    #[test]
    fn test_phase_transitions() {
        use AuthorizationPhase::*;
        assert!(NotStarted.can_transition_to(UrlBuilt));
        assert!(UrlBuilt.can_transition_to(ManualEntry));
        assert!(CallbackTimedOut.can_transition_to(ManualEntry));
        assert!(!WaitingForCallback.can_transition_to(ManualEntry));
        assert!(!ManualEntry.can_transition_to(ManualEntry));
        assert!(!CodeReceived.can_transition_to(ManualEntry));
        assert!(CodeReceived.is_terminal());
        assert!(Skipped.is_terminal());
        assert!(!CallbackTimedOut.is_terminal());
    }
}
