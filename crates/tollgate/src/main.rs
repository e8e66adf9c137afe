//! Tollgate - OAuth proxy gateway test harness
//!
//! Main entry point for the Tollgate CLI.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use tollgate_oauth::config::{DEFAULT_CLIENT_NAME, DEFAULT_GATEWAY_URL};
use tollgate_oauth::{AuthorizeConfig, Flow, HarnessConfig};

mod interact;
mod report;

use interact::{ConsoleBrowser, StdinPrompt};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tollgate - exercise an OAuth-proxy gateway end to end
///
/// Registers a client, runs the authorization-code + PKCE flow, exchanges the
/// code for a token and probes the target proxy with it (and with an API key).
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Target proxy URL (e.g. http://localhost:8093)
    #[arg(long)]
    pub target: String,

    /// Proxy ID for the OAuth-proxy API endpoints
    #[arg(long)]
    pub proxy_id: u64,

    /// Gateway API URL
    #[arg(long, env = "TOLLGATE_GATEWAY", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway: String,

    /// Gateway API key for the hybrid-auth probe
    #[arg(long, env = "GATEWAY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OAuth scopes, space-separated (omit for provider defaults)
    #[arg(long)]
    pub scope: Option<String>,

    /// Redirect URI to register (repeatable; the first is used for the callback)
    #[arg(long = "redirect-uri", value_name = "URI")]
    pub redirect_uris: Vec<String>,

    /// Client name sent with registration
    #[arg(long, default_value = DEFAULT_CLIENT_NAME)]
    pub client_name: String,

    /// Seconds to wait for the browser redirect before asking for the code
    #[arg(long, default_value_t = 300, value_name = "SECS")]
    pub callback_timeout: u64,

    /// Print the authorization URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Also write JSON logs to a daily-rotated file in this directory
    #[arg(long, env = "TOLLGATE_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    fn harness_config(&self) -> HarnessConfig {
        HarnessConfig::new(&self.target, self.proxy_id)
            .with_gateway(&self.gateway)
            .with_api_key(self.api_key.clone())
            .with_scope(self.scope.clone())
            .with_redirect_uris(self.redirect_uris.clone())
            .with_client_name(&self.client_name)
            .with_authorize(
                AuthorizeConfig::default()
                    .with_callback_timeout(Duration::from_secs(self.callback_timeout)),
            )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Console (human-readable, stderr so it never mixes with prompts) plus an
    // optional rotating JSON file.
    let filter = if cli.verbose {
        "tollgate=debug,tollgate_oauth=debug,info"
    } else {
        "tollgate=info,tollgate_oauth=info,warn"
    };

    use tracing_subscriber::prelude::*;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new(filter));

    let (file_layer, _guard) = match &cli.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "tollgate.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "tollgate=trace,tollgate_oauth=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    let config = cli.harness_config();
    report::print_banner(&config);

    let browser = ConsoleBrowser::new(!cli.no_browser, config.authorize.callback_timeout);
    let flow = Flow::new(config, Arc::new(StdinPrompt)).with_user_agent(Arc::new(browser));

    match flow.run().await {
        Ok(report) => {
            tracing::debug!(
                status = ?report.status(),
                probes = report.probes.len(),
                "Flow finished"
            );
            report::print_summary(&report, flow.config());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Flow aborted");
            report::print_failure(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}
