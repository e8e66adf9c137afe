//! Single-use local HTTP listener that captures the OAuth redirect.
//!
//! The listener runs an axum router on a background tokio task and writes
//! what it receives into a [`CallbackSlot`] owned by the caller. The slot is
//! single-assignment: the first qualifying callback wins and later requests
//! are answered but never overwrite it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse},
    routing::get,
};
use parking_lot::Mutex;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long `shutdown` waits for in-flight responses before aborting the task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// What the authorization redirect carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// Redirect with an authorization code. `state` is empty if the provider
    /// sent none, which never matches a generated state.
    Success { code: String, state: String },
    /// Redirect with an `error` parameter.
    Failure {
        error: String,
        error_description: Option<String>,
    },
    /// Nothing arrived before the deadline.
    Timeout,
}

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Empty,
    Filled(CallbackResult),
    Taken,
}

/// Lock-guarded, write-once cell shared between the listener and the waiter.
#[derive(Debug, Clone, Default)]
pub struct CallbackSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `result` unless something was stored before. Returns whether it was stored.
    pub fn set(&self, result: CallbackResult) -> bool {
        let mut state = self.inner.lock();
        match *state {
            SlotState::Empty => {
                *state = SlotState::Filled(result);
                true
            }
            _ => false,
        }
    }

    /// Look at the stored result without consuming it.
    pub fn peek(&self) -> Option<CallbackResult> {
        match &*self.inner.lock() {
            SlotState::Filled(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Consume the stored result. Subsequent takes and sets are no-ops.
    pub fn take(&self) -> Option<CallbackResult> {
        let mut state = self.inner.lock();
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Filled(result) => Some(result),
            SlotState::Empty => {
                *state = SlotState::Empty;
                None
            }
            SlotState::Taken => None,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(*self.inner.lock(), SlotState::Filled(_))
    }
}

/// Where to listen for a given redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAddress {
    /// `host:port` suitable for binding.
    pub bind: String,
    /// Route path, always starting with `/`.
    pub path: String,
}

impl CallbackAddress {
    /// Derive the bind address and path from an `http://` redirect URI.
    ///
    /// Returns `None` for URIs a local listener cannot serve (custom schemes,
    /// `https`, missing host).
    pub fn from_redirect_uri(redirect_uri: &str) -> Option<Self> {
        let url = url::Url::parse(redirect_uri).ok()?;
        if url.scheme() != "http" {
            return None;
        }
        let host = match url.host()? {
            url::Host::Domain("localhost") => "127.0.0.1".to_string(),
            url::Host::Domain(d) => d.to_string(),
            url::Host::Ipv4(ip) => ip.to_string(),
            url::Host::Ipv6(ip) => format!("[{}]", ip),
        };
        let port = url.port_or_known_default()?;
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Some(Self {
            bind: format!("{}:{}", host, port),
            path,
        })
    }
}

/// Build the callback router for `path`. Requests are not logged.
pub fn callback_router(path: &str, slot: CallbackSlot) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .with_state(slot)
}

async fn handle_callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let (status, page) = if let Some(error) = non_empty(&params, "error") {
        let description = params.get("error_description").cloned();
        let page = failure_page(error, description.as_deref().unwrap_or(""));
        slot.set(CallbackResult::Failure {
            error: error.clone(),
            error_description: description,
        });
        (StatusCode::BAD_REQUEST, page)
    } else if let Some(code) = non_empty(&params, "code") {
        slot.set(CallbackResult::Success {
            code: code.clone(),
            state: params.get("state").cloned().unwrap_or_default(),
        });
        (StatusCode::OK, SUCCESS_PAGE.to_string())
    } else {
        (
            StatusCode::BAD_REQUEST,
            failure_page("missing_code", "No authorization code received."),
        )
    };

    (status, [(header::CONNECTION, "close")], Html(page))
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a String> {
    params.get(key).filter(|v| !v.is_empty())
}

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>OAuth Success</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h1>Authorization Successful</h1>
<p>You can close this window and return to the terminal.</p>
<script>setTimeout(() => window.close(), 2000);</script>
</body>
</html>"#;

fn failure_page(error: &str, description: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>OAuth Error</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h1>Authorization Failed</h1>
<p>Error: {}</p>
<p>Description: {}</p>
</body>
</html>"#,
        escape_html(error),
        escape_html(description)
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A running callback listener.
///
/// Dropping it signals shutdown; call [`CallbackListener::shutdown`] to also
/// wait for the socket to be released.
#[derive(Debug)]
pub struct CallbackListener {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `addr` and serve `GET {path}` on a background task.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        path: &str,
        slot: CallbackSlot,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let router = callback_router(path, slot);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tracing::debug!(addr = %local_addr, path, "Callback listener started");

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "Callback listener stopped with error");
            }
        });

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Bind the address implied by `redirect_uri`.
    pub async fn for_redirect_uri(redirect_uri: &str, slot: CallbackSlot) -> std::io::Result<Self> {
        let address = CallbackAddress::from_redirect_uri(redirect_uri).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("redirect URI cannot be served locally: {}", redirect_uri),
            )
        })?;
        Self::bind(address.bind.as_str(), &address.path, slot).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the listener and release its socket. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
            }
            tracing::debug!(addr = %self.local_addr, "Callback listener stopped");
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn send(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_code_callback_sets_success() {
        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());

        let status = send(router, "/callback?code=X&state=Y").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            slot.peek(),
            Some(CallbackResult::Success {
                code: "X".into(),
                state: "Y".into()
            })
        );
    }

    #[tokio::test]
    async fn test_second_callback_does_not_overwrite() {
        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());

        send(router.clone(), "/callback?code=X&state=Y").await;
        let status = send(router, "/callback?code=OTHER&state=Z").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            slot.peek(),
            Some(CallbackResult::Success {
                code: "X".into(),
                state: "Y".into()
            })
        );
    }

    #[tokio::test]
    async fn test_error_callback_sets_failure() {
        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());

        let status = send(
            router,
            "/callback?error=access_denied&error_description=user%20said%20no",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            slot.peek(),
            Some(CallbackResult::Failure {
                error: "access_denied".into(),
                error_description: Some("user said no".into())
            })
        );
    }

    #[tokio::test]
    async fn test_error_wins_over_code() {
        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());

        send(router, "/callback?error=access_denied&code=X").await;

        assert!(matches!(
            slot.peek(),
            Some(CallbackResult::Failure { ref error, .. }) if error == "access_denied"
        ));
    }

    #[tokio::test]
    async fn test_request_without_code_or_error_leaves_slot_empty() {
        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());

        let status = send(router, "/callback?state=Y").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!slot.is_filled());
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected() {
        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());

        let status = send(router, "/callback?code=&state=Y").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!slot.is_filled());
    }

    #[tokio::test]
    async fn test_empty_error_falls_through_to_code() {
        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());

        let status = send(router, "/callback?error=&code=X&state=Y").await;
        assert_eq!(status, StatusCode::OK);
        assert!(matches!(slot.peek(), Some(CallbackResult::Success { .. })));

        let slot = CallbackSlot::new();
        let router = callback_router("/callback", slot.clone());
        let status = send(router, "/callback?error=&code=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!slot.is_filled());
    }

    #[test]
    fn test_slot_take_is_single_use() {
        let slot = CallbackSlot::new();
        assert_eq!(slot.take(), None);
        assert!(slot.set(CallbackResult::Timeout));
        assert!(!slot.set(CallbackResult::Success {
            code: "late".into(),
            state: String::new()
        }));
        assert_eq!(slot.take(), Some(CallbackResult::Timeout));
        assert_eq!(slot.take(), None);
        assert!(!slot.set(CallbackResult::Timeout));
    }

    #[test]
    fn test_callback_address_from_redirect_uri() {
        assert_eq!(
            CallbackAddress::from_redirect_uri("http://localhost:8888/callback"),
            Some(CallbackAddress {
                bind: "127.0.0.1:8888".into(),
                path: "/callback".into()
            })
        );
        assert_eq!(
            CallbackAddress::from_redirect_uri("http://127.0.0.1/"),
            Some(CallbackAddress {
                bind: "127.0.0.1:80".into(),
                path: "/".into()
            })
        );
        assert_eq!(CallbackAddress::from_redirect_uri("cursor://oauth-callback"), None);
        assert_eq!(CallbackAddress::from_redirect_uri("https://localhost/cb"), None);
    }

    #[test]
    fn test_failure_page_escapes() {
        let page = failure_page("<script>", "a & b");
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("a &amp; b"));
    }

    #[tokio::test]
    async fn test_listener_serves_and_shuts_down() {
        let slot = CallbackSlot::new();
        let mut listener = CallbackListener::bind("127.0.0.1:0", "/callback", slot.clone())
            .await
            .unwrap();
        let addr = listener.local_addr();

        let status = reqwest::get(format!("http://{}/callback?code=abc&state=s", addr))
            .await
            .unwrap()
            .status();
        assert_eq!(status, 200);
        assert_eq!(
            slot.take(),
            Some(CallbackResult::Success {
                code: "abc".into(),
                state: "s".into()
            })
        );

        listener.shutdown().await;
        assert!(!listener.is_running());
        listener.shutdown().await;

        // Port is free again.
        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_without_callback() {
        let mut listener = CallbackListener::bind("127.0.0.1:0", "/callback", CallbackSlot::new())
            .await
            .unwrap();
        assert!(listener.is_running());
        listener.shutdown().await;
        assert!(!listener.is_running());
    }
}
