//! End-to-end harness run: register, authorize, exchange, probe.

use std::sync::Arc;

use crate::authorize::{AuthorizationOutcome, Authorizer};
use crate::config::HarnessConfig;
use crate::error::{AuthorizationError, Result};
use crate::interact::{CodePrompt, UserAgent};
use crate::pkce::PkceParameters;
use crate::probe::{CredentialKind, HealthStatus, ProbeResult, ProbeRunner};
use crate::registration::{ClientRegistrar, ClientRegistration};
use crate::token::{TokenExchanger, TokenResponse};

/// How far a run got without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Tokens were obtained and the probes ran.
    Completed,
    /// The operator skipped manual code entry.
    Skipped,
}

/// Everything a successful (or skipped) run observed.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub health: HealthStatus,
    pub registration: ClientRegistration,
    pub authorization: AuthorizationOutcome,
    pub tokens: Option<TokenResponse>,
    /// One entry per credential kind that was tried, in order.
    pub probes: Vec<ProbeResult>,
}

impl FlowReport {
    pub fn status(&self) -> FlowStatus {
        match self.authorization {
            AuthorizationOutcome::Skipped => FlowStatus::Skipped,
            AuthorizationOutcome::Code(_) => FlowStatus::Completed,
        }
    }

    pub fn probe(&self, kind: CredentialKind) -> Option<&ProbeResult> {
        self.probes.iter().find(|p| p.kind == kind)
    }
}

/// Sequences the harness stages for one configuration.
#[derive(Debug, Clone)]
pub struct Flow {
    config: HarnessConfig,
    registrar: ClientRegistrar,
    authorizer: Authorizer,
    exchanger: TokenExchanger,
    prober: ProbeRunner,
}

impl Flow {
    pub fn new(config: HarnessConfig, prompt: Arc<dyn CodePrompt>) -> Self {
        let http = config.http.client();
        Self {
            registrar: ClientRegistrar::new(http.clone()),
            authorizer: Authorizer::new(prompt).with_config(config.authorize.clone()),
            exchanger: TokenExchanger::new(http.clone()),
            prober: ProbeRunner::new(http).with_health_timeout(config.http.health_timeout),
            config,
        }
    }

    pub fn with_user_agent(mut self, user_agent: Arc<dyn UserAgent>) -> Self {
        self.authorizer = self.authorizer.with_user_agent(user_agent);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every stage. Registration, authorization and token-exchange
    /// failures abort the run; probe failures are recorded in the report.
    pub async fn run(&self) -> Result<FlowReport> {
        let config = &self.config;

        let health = self.prober.health(&config.target_url).await;
        match &health {
            HealthStatus::Healthy => tracing::info!("Target is healthy"),
            HealthStatus::Unexpected(status) => {
                tracing::warn!(
                    status,
                    "Target health check returned unexpected status, continuing"
                )
            }
            HealthStatus::Unreachable(e) => {
                tracing::warn!(error = %e, "Target health check failed, continuing")
            }
        }

        let registration = self
            .registrar
            .register(
                &config.gateway_url,
                config.proxy_id,
                &config.redirect_uris,
                &config.client_name,
                config.scope.as_deref(),
            )
            .await?;

        let redirect_uri = config
            .redirect_uris
            .first()
            .ok_or_else(|| AuthorizationError::UnregisteredRedirectUri(String::new()))?;
        if !registration.is_registered(redirect_uri) {
            return Err(AuthorizationError::UnregisteredRedirectUri(redirect_uri.clone()).into());
        }

        let pkce = PkceParameters::generate();
        tracing::debug!(challenge = %pkce.challenge(), "PKCE parameters generated");

        let authorization = self
            .authorizer
            .authorize(
                &registration.authorization_endpoint,
                &registration.client_id,
                redirect_uri,
                &pkce,
                config.scope.as_deref(),
            )
            .await?;

        let AuthorizationOutcome::Code(code) = authorization.clone() else {
            tracing::warn!("No authorization code provided, skipping token exchange and probes");
            return Ok(FlowReport {
                health,
                registration,
                authorization,
                tokens: None,
                probes: Vec::new(),
            });
        };

        let tokens = self
            .exchanger
            .exchange(
                &registration.token_endpoint,
                &registration.client_id,
                &registration.client_secret,
                &code.code,
                &code.redirect_uri,
                pkce.verifier(),
            )
            .await?;

        let mut probes = vec![
            self.prober
                .probe(&config.target_url, &tokens.access_token, CredentialKind::OAuthToken)
                .await,
        ];
        if let Some(api_key) = &config.api_key {
            probes.push(
                self.prober
                    .probe(&config.target_url, api_key, CredentialKind::ApiKey)
                    .await,
            );
        }

        Ok(FlowReport {
            health,
            registration,
            authorization,
            tokens: Some(tokens),
            probes,
        })
    }
}
