//! Shared fakes for the integration tests: a scripted operator prompt and a
//! "browser" that follows the authorization URL straight to the callback.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tollgate_oauth::{AuthorizeConfig, CodePrompt, UserAgent};

/// Find a free local port for a callback redirect URI.
pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub async fn callback_uri() -> String {
    format!("http://127.0.0.1:{}/callback", free_port().await)
}

/// Short waits so timeout paths finish quickly.
pub fn fast_authorize() -> AuthorizeConfig {
    AuthorizeConfig::default()
        .with_callback_timeout(Duration::from_millis(1500))
        .with_poll_interval(Duration::from_millis(20))
}

/// Answers the manual prompt with a fixed string and counts how often it was asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answer: String,
    calls: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodePrompt for ScriptedPrompt {
    async fn read_code(&self, _authorization_url: &str) -> std::io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// What the fake provider sends back to the redirect URI.
#[derive(Debug, Clone)]
pub enum Redirect {
    /// `?code=..&state=<state from the request>`
    Code(String),
    /// `?code=..&state=<this value>`
    CodeWithState(String, String),
    /// `?error=..`
    Error(String),
}

/// Plays the browser plus provider: reads `redirect_uri` and `state` from the
/// authorization URL and hits the callback.
#[derive(Debug)]
pub struct RedirectingBrowser {
    redirect: Redirect,
}

impl RedirectingBrowser {
    pub fn new(redirect: Redirect) -> Arc<Self> {
        Arc::new(Self { redirect })
    }
}

#[async_trait]
impl UserAgent for RedirectingBrowser {
    async fn open(&self, url: &str) -> std::io::Result<()> {
        let parsed = url::Url::parse(url).map_err(std::io::Error::other)?;
        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        };
        let redirect_uri = param("redirect_uri");
        let state = param("state");

        let query = match &self.redirect {
            Redirect::Code(code) => format!("code={}&state={}", code, state),
            Redirect::CodeWithState(code, forged) => format!("code={}&state={}", code, forged),
            Redirect::Error(error) => format!("error={}", error),
        };
        let callback = format!("{}?{}", redirect_uri, query);

        tokio::spawn(async move {
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}
