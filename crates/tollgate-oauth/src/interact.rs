//! Seams for the interactive parts of the flow: opening the authorization
//! URL and asking the operator for a code.

use async_trait::async_trait;

/// Something that can show the authorization URL to the user.
#[async_trait]
pub trait UserAgent: Send + Sync + std::fmt::Debug {
    /// Open `url`. Failure is reported to the caller, which treats it as a warning.
    async fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Asks the operator for an authorization code when the callback never came.
#[async_trait]
pub trait CodePrompt: Send + Sync + std::fmt::Debug {
    /// Return whatever the operator typed. An empty string means "skip".
    ///
    /// `authorization_url` is passed so the prompt can show it again.
    async fn read_code(&self, authorization_url: &str) -> std::io::Result<String>;
}

/// Opens URLs with the platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

#[async_trait]
impl UserAgent for SystemBrowser {
    async fn open(&self, url: &str) -> std::io::Result<()> {
        #[cfg(target_os = "macos")]
        let status = tokio::process::Command::new("open").arg(url).status().await?;
        #[cfg(target_os = "windows")]
        let status = tokio::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()
            .await?;
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let status = tokio::process::Command::new("xdg-open")
            .arg(url)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "browser launcher exited with {}",
                status
            )))
        }
    }
}

/// Leaves opening the URL to the operator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

#[async_trait]
impl UserAgent for NoBrowser {
    async fn open(&self, _url: &str) -> std::io::Result<()> {
        tracing::debug!("Browser launch disabled; URL must be opened manually");
        Ok(())
    }
}
