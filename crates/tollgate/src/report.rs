//! Console output: banner, per-stage summary, fatal errors.

use console::{Style, style};
use tollgate_oauth::{
    AuthorizationError, AuthorizationOutcome, CodeSource, CredentialKind, FlowError, FlowReport,
    FlowStatus, HarnessConfig, HealthStatus, ProbeResult, RegistrationError, TokenError,
};

/// Longest response body printed for a passing probe.
const SUCCESS_BODY_PREVIEW: usize = 500;

pub fn print_banner(config: &HarnessConfig) {
    let dim = Style::new().dim();

    println!("{}", style("OAuth Proxy Gateway Test").bold());
    println!("{}", style("========================").bold());
    println!("  Gateway:   {}", style(&config.gateway_url).cyan());
    println!("  Proxy ID:  {}", style(config.proxy_id).cyan());
    println!("  Target:    {}", style(&config.target_url).cyan());
    match &config.scope {
        Some(scope) => println!("  Scope:     {}", style(scope).cyan()),
        None => println!("  Scope:     {}", dim.apply_to("(provider defaults)")),
    }
    match &config.api_key {
        Some(key) => println!("  API key:   {}", mask(key)),
        None => println!("  API key:   {}", dim.apply_to("(not set)")),
    }
    println!();
}

pub fn print_summary(report: &FlowReport, config: &HarnessConfig) {
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Test Summary").bold());
    println!("{}", style("------------").bold());

    match &report.health {
        HealthStatus::Healthy => pass("Target health check"),
        HealthStatus::Unexpected(status) => warn(&format!(
            "Target health check returned {} (continued anyway)",
            status
        )),
        HealthStatus::Unreachable(e) => {
            warn(&format!("Target health check failed: {} (continued anyway)", e))
        }
    }

    pass("Dynamic Client Registration");
    println!("    {} {}", dim.apply_to("Client ID:"), report.registration.client_id);
    println!(
        "    {} {}",
        dim.apply_to("Client secret:"),
        mask(&report.registration.client_secret)
    );

    if report.status() == FlowStatus::Skipped {
        warn("OAuth Authorization: skipped (no code entered)");
        println!();
        println!("To finish manually:");
        println!("  1. Open the authorization URL in a browser");
        println!("  2. Complete the OAuth login");
        println!("  3. Copy the code from the callback URL");
        println!("  4. Run tollgate again and paste it at the prompt");
        return;
    }

    if let AuthorizationOutcome::Code(code) = &report.authorization {
        let via = match code.source {
            CodeSource::Callback => "via callback",
            CodeSource::Manual => "entered manually",
        };
        pass(&format!("OAuth Authorization ({})", via));
    }

    if let Some(tokens) = &report.tokens {
        pass("Token Exchange");
        println!("    {} {}", dim.apply_to("Access token:"), mask(&tokens.access_token));
        println!(
            "    {} {}",
            dim.apply_to("Token type:"),
            tokens.token_type.as_deref().unwrap_or("(not sent)")
        );
        if let Some(expires_in) = tokens.expires_in {
            let at = tokens
                .expires_at()
                .map(|t| format!(" ({})", t.to_rfc3339()))
                .unwrap_or_default();
            println!("    {} {}s{}", dim.apply_to("Expires in:"), expires_in, at);
        }
        if tokens.refresh_token.is_some() {
            println!("    {} yes", dim.apply_to("Refresh token:"));
        }
    }

    match report.probe(CredentialKind::OAuthToken) {
        Some(result) => print_probe("Proxy access with OAuth token", result),
        None => fail("Proxy access with OAuth token: not run"),
    }

    match report.probe(CredentialKind::ApiKey) {
        Some(result) => {
            print_probe("Proxy access with API key", result);
            if result.success {
                println!(
                    "    {}",
                    dim.apply_to("API keys work alongside the OAuth proxy (hybrid mode)")
                );
            }
        }
        None if config.api_key.is_none() => {
            warn("Proxy access with API key: skipped (use --api-key or GATEWAY_API_KEY)")
        }
        None => fail("Proxy access with API key: not run"),
    }

    println!();
    println!("Test completed.");
}

fn print_probe(label: &str, result: &ProbeResult) {
    if result.success {
        pass(label);
        if let Some(body) = &result.body {
            println!("    {}", Style::new().dim().apply_to(preview(body)));
        }
        return;
    }

    match result.status {
        Some(status) => fail(&format!("{}: {}", label, status)),
        None => fail(&format!("{}: no response", label)),
    }
    if let Some(body) = &result.body {
        println!("    Response: {}", body);
    }
    if let Some(error) = &result.error {
        println!("    Error: {}", error);
    }
}

/// Print a fatal stage failure with the server's status and body verbatim.
pub fn print_failure(err: &FlowError) {
    let red = Style::new().red().bold();

    eprintln!();
    match err {
        FlowError::Registration(e) => {
            eprintln!("{}", red.apply_to("Dynamic Client Registration failed"));
            match e {
                RegistrationError::Status { status, body }
                | RegistrationError::MissingCredentials { status, body } => {
                    eprintln!("  Status:   {}", status);
                    eprintln!("  Response: {}", body);
                }
                RegistrationError::Network(msg) => eprintln!("  {}", msg),
            }
        }
        FlowError::Authorization(e) => {
            eprintln!("{}", red.apply_to("OAuth Authorization failed"));
            match e {
                AuthorizationError::Provider { error, description } => {
                    eprintln!("  Error:       {}", error);
                    if let Some(description) = description {
                        eprintln!("  Description: {}", description);
                    }
                }
                other => eprintln!("  {}", other),
            }
        }
        FlowError::Token(e) => {
            eprintln!("{}", red.apply_to("Token Exchange failed"));
            match e {
                TokenError::Status { status, body } => {
                    eprintln!("  Status:   {}", status);
                    eprintln!("  Response: {}", body);
                }
                TokenError::MissingAccessToken { body } => {
                    eprintln!("  No access_token in response");
                    eprintln!("  Response: {}", body);
                }
                TokenError::Network(msg) => eprintln!("  {}", msg),
            }
            eprintln!("  Cannot test proxy access.");
        }
    }
}

fn pass(msg: &str) {
    println!("{} {}", style("PASS").green().bold(), msg);
}

fn warn(msg: &str) {
    println!("{} {}", style("SKIP").yellow().bold(), msg);
}

fn fail(msg: &str) {
    println!("{} {}", style("FAIL").red().bold(), msg);
}

/// Show the first and last four characters of a secret.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

fn preview(body: &str) -> String {
    match body.char_indices().nth(SUCCESS_BODY_PREVIEW) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
