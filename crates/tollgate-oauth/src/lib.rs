//! OAuth 2.1 authorization-code + PKCE test harness for OAuth-proxy gateways.
//!
//! Registers a client dynamically, walks the operator through the gateway's
//! authorization endpoint, captures the redirect on a short-lived local
//! listener (or asks for the code by hand), redeems the code, and probes the
//! protected proxy with both the OAuth token and a static API key.
//!
//! # Components
//!
//! - [`pkce`]: verifier/challenge pair and CSRF state values
//! - [`registration`]: Dynamic Client Registration
//! - [`callback`]: local redirect listener and its write-once result slot
//! - [`authorize`]: authorization URL, callback wait, manual fallback
//! - [`token`]: authorization-code exchange
//! - [`probe`]: hybrid-auth probes and target health check
//! - [`flow`]: runs the stages in order and reports what happened

pub mod authorize;
pub mod callback;
pub mod config;
pub mod error;
pub mod flow;
pub mod interact;
pub mod pkce;
pub mod probe;
pub mod registration;
pub mod token;

pub use authorize::{
    AuthorizationCode, AuthorizationOutcome, AuthorizationPhase, AuthorizationState, Authorizer,
    CodeSource,
};
pub use callback::{CallbackListener, CallbackResult, CallbackSlot};
pub use config::{AuthorizeConfig, HarnessConfig, HttpConfig};
pub use error::{AuthorizationError, FlowError, RegistrationError, Result, TokenError};
pub use flow::{Flow, FlowReport, FlowStatus};
pub use interact::{CodePrompt, NoBrowser, SystemBrowser, UserAgent};
pub use pkce::PkceParameters;
pub use probe::{CredentialKind, HealthStatus, ProbeResult, ProbeRunner};
pub use registration::{ClientRegistrar, ClientRegistration};
pub use token::{TokenExchanger, TokenResponse};
