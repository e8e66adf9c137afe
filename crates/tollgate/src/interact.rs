//! Terminal implementations of the browser and manual-code prompt.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use console::{Style, style};
use tollgate_oauth::{CodePrompt, SystemBrowser, UserAgent};

/// Prints the authorization URL and optionally hands it to the system browser.
#[derive(Debug)]
pub struct ConsoleBrowser {
    launch: bool,
    callback_timeout: Duration,
}

impl ConsoleBrowser {
    pub fn new(launch: bool, callback_timeout: Duration) -> Self {
        Self {
            launch,
            callback_timeout,
        }
    }
}

#[async_trait]
impl UserAgent for ConsoleBrowser {
    async fn open(&self, url: &str) -> std::io::Result<()> {
        let dim = Style::new().dim();

        println!();
        println!("Open this URL in your browser:");
        println!();
        println!("  {}", style(url).cyan());
        println!();

        let result = if self.launch {
            let result = SystemBrowser.open(url).await;
            if result.is_err() {
                println!("{}", dim.apply_to("(Could not open browser automatically)"));
            }
            result
        } else {
            Ok(())
        };

        println!(
            "Waiting for the OAuth callback (timeout: {}s). Complete the login in your browser.",
            self.callback_timeout.as_secs()
        );
        println!();
        result
    }
}

/// Reads the authorization code from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl CodePrompt for StdinPrompt {
    async fn read_code(&self, authorization_url: &str) -> std::io::Result<String> {
        let yellow = Style::new().yellow();
        let dim = Style::new().dim();

        println!();
        println!("{}", yellow.apply_to("MANUAL CODE ENTRY"));
        println!("{}", yellow.apply_to("================="));
        println!("1. Complete the OAuth login at:");
        println!("   {}", style(authorization_url).cyan());
        println!("2. You will be redirected to a callback URL");
        println!("3. Copy the 'code' parameter (or paste the whole callback URL)");
        println!();
        println!(
            "{}",
            dim.apply_to("   e.g. http://localhost:8888/callback?code=AUTHORIZATION_CODE&state=...")
        );
        println!();
        print!("Enter authorization code (or press Enter to skip): ");
        std::io::stdout().flush()?;

        tokio::task::spawn_blocking(|| -> std::io::Result<String> {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            Ok(input)
        })
        .await
        .map_err(std::io::Error::other)?
    }
}
