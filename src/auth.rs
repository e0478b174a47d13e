//! Authentication Flow
//!
//! Bridges the OAuth implicit-grant redirect and the session store. Builds
//! the provider authorization URL for a slot, parses the redirect fragment
//! into a slot-bound grant, and hosts the loopback listener that captures
//! the fragment from the browser.
//!
//! Implicit-grant tokens travel in the URL fragment, which the browser never
//! sends over the wire. The listener therefore serves a small page whose
//! script forwards `location.hash` back as a `/capture` query before the
//! fragment can be parsed.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};
use url::Url;

use crate::config::AppConfig;
use crate::engine::DriveSlot;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid authorization endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("callback listener error: {0}")]
    Callback(String),
}

/// A redirect fragment that carried both a token and a known slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub slot: DriveSlot,
    pub token: String,
}

/// Build the provider authorization URL for `slot`.
///
/// The slot letter rides along as opaque `state` and comes back in the
/// redirect fragment, which is how the grant finds its way to the right
/// session.
pub fn authorize_url(
    config: &AppConfig,
    slot: DriveSlot,
    redirect_uri: &str,
) -> Result<String, AuthError> {
    let url = Url::parse_with_params(
        &config.auth_endpoint,
        &[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "token"),
            ("scope", config.scope.as_str()),
            ("state", slot.as_str()),
        ],
    )
    .map_err(|e| AuthError::InvalidEndpoint(format!("{}: {}", config.auth_endpoint, e)))?;

    Ok(url.into())
}

/// Parse a fragment-encoded parameter set into a grant.
///
/// Returns `None` when the fragment is empty, the token or state is
/// missing, or the state names no known slot. That is expected noise (a
/// start with no pending redirect), not an error, and re-invoking with an
/// already-cleared fragment stays a no-op.
pub fn parse_fragment(fragment: &str) -> Option<AuthGrant> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    if fragment.is_empty() {
        return None;
    }

    let mut token = None;
    let mut state = None;
    for param in fragment.split('&') {
        let mut kv = param.splitn(2, '=');
        let key = kv.next().unwrap_or("");
        let value = kv.next().unwrap_or("");

        match key {
            "access_token" => token = Some(urlencoding::decode(value).unwrap_or_default().to_string()),
            "state" => state = Some(urlencoding::decode(value).unwrap_or_default().to_string()),
            _ => {}
        }
    }

    let token = token.filter(|t| !t.is_empty())?;
    let slot = match state?.parse::<DriveSlot>() {
        Ok(slot) => slot,
        Err(e) => {
            debug!("ignoring redirect fragment: {}", e);
            return None;
        }
    };

    Some(AuthGrant { slot, token })
}

/// Bind the redirect listener on `port` (0 = ephemeral). Returns the
/// listener and the actual port for building the redirect URI.
pub async fn bind_callback_listener_on_port(port: u16) -> Result<(TcpListener, u16), AuthError> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| AuthError::Callback(format!("failed to bind port {}: {}", port, e)))?;

    let actual_port = listener
        .local_addr()
        .map(|a| a.port())
        .map_err(|e| AuthError::Callback(format!("failed to read local port: {}", e)))?;

    info!("authorization callback listener bound on port {}", actual_port);
    Ok((listener, actual_port))
}

/// Serve the loopback exchange until the browser hands over the fragment,
/// then return it raw (possibly empty). The caller feeds the result to the
/// coordinator's `complete_auth`, where an empty fragment is a no-op.
pub async fn wait_for_fragment(listener: &TcpListener) -> Result<String, AuthError> {
    loop {
        let (mut socket, _) = listener
            .accept()
            .await
            .map_err(|e| AuthError::Callback(format!("failed to accept connection: {}", e)))?;

        let mut buffer = vec![0u8; 4096];
        let n = socket
            .read(&mut buffer)
            .await
            .map_err(|e| AuthError::Callback(format!("failed to read request: {}", e)))?;
        let request = String::from_utf8_lossy(&buffer[..n]).into_owned();

        match request_path(&request).and_then(capture_query) {
            Some(fragment) => {
                let fragment = fragment.to_string();
                respond(&mut socket, DONE_PAGE).await?;
                return Ok(fragment);
            }
            None => {
                // First hop: the provider redirected here with the grant in
                // the fragment. Hand the browser the forwarding script.
                respond(&mut socket, FORWARD_PAGE).await?;
            }
        }
    }
}

async fn respond(socket: &mut tokio::net::TcpStream, body: &str) -> Result<(), AuthError> {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    socket
        .write_all(response.as_bytes())
        .await
        .map_err(|e| AuthError::Callback(format!("failed to send response: {}", e)))
}

/// Request target of the first line: `GET /capture?… HTTP/1.1` → `/capture?…`.
fn request_path(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    if method != "GET" {
        return None;
    }
    parts.next()
}

/// Query portion of a `/capture` request, which carries the relayed
/// fragment verbatim.
fn capture_query(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/capture")?;
    match rest.as_bytes().first() {
        Some(b'?') => Some(&rest[1..]),
        None => Some(""),
        Some(_) => None,
    }
}

const FORWARD_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>DriveFerry - Authorization</title>
<style>
  body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif;
         display: flex; justify-content: center; align-items: center;
         min-height: 100vh; background: #16213e; color: #fff; }
  .card { text-align: center; padding: 40px 48px; background: rgba(255,255,255,0.06);
          border-radius: 16px; }
</style>
</head>
<body>
<div class="card">
  <h1>DriveFerry</h1>
  <p id="msg">Handing the authorization back to the app&hellip;</p>
</div>
<script>
  fetch("/capture?" + location.hash.slice(1))
    .then(function () {
      document.getElementById("msg").textContent =
        "Authorization received. You can close this tab and return to DriveFerry.";
    })
    .catch(function () {
      document.getElementById("msg").textContent =
        "Could not hand the authorization back. Is DriveFerry still running?";
    });
</script>
</body>
</html>"#;

const DONE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>DriveFerry</title></head>
<body>OK</body>
</html>"#;
