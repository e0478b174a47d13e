//! rclone Remote-Control Engine
//!
//! Production `TransferEngine` backed by an `rclone rcd` daemon. Each call
//! configures the remote on the fly through a connection string carrying the
//! session's access token, so the daemon itself stays stateless.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::types::{DriveSlot, EngineError, TransferRequest};
use super::TransferEngine;

/// HTTP client for the rclone remote-control API.
pub struct RcloneRcEngine {
    base_url: String,
    client: reqwest::Client,
}

impl RcloneRcEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, op: &str, body: Value) -> Result<(reqwest::StatusCode, Value), EngineError> {
        let url = format!("{}/{}", self.base_url, op);
        debug!("engine call {}", op);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EngineError::Unavailable(format!("{}: {}", self.base_url, e))
                } else {
                    EngineError::CallFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| EngineError::CallFailed(format!("invalid engine payload: {}", e)))?;

        Ok((status, payload))
    }
}

#[async_trait]
impl TransferEngine for RcloneRcEngine {
    async fn list_files(
        &self,
        slot: DriveSlot,
        token: &str,
        path_prefix: &str,
    ) -> Result<Value, EngineError> {
        let body = json!({
            "fs": drive_fs(token, ""),
            "remote": path_prefix,
        });

        let (status, payload) = self.call("operations/list", body).await?;
        if !status.is_success() {
            // The daemon answered, so report the failure inside the boundary
            // shape and let the adapter surface it.
            let message = error_text(&payload)
                .unwrap_or_else(|| format!("engine returned {} for drive {}", status, slot));
            warn!("listing for drive {} failed: {}", slot, message);
            return Ok(json!({ "error": message }));
        }

        let files: Vec<Value> = payload
            .get("list")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("Path").and_then(Value::as_str))
                    .map(|path| Value::String(path.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({ "files": files }))
    }

    async fn start_transfer(&self, request: &TransferRequest) -> Result<Value, EngineError> {
        let body = json!({
            "srcFs": drive_fs(&request.source_token, ""),
            "srcRemote": request.source_path,
            "dstFs": drive_fs(&request.dest_token, ""),
            "dstRemote": dest_remote(&request.source_path, &request.dest_path),
            "_async": true,
        });

        let (status, payload) = self.call("operations/copyfile", body).await?;
        if !status.is_success() {
            let message = error_text(&payload)
                .unwrap_or_else(|| format!("engine returned {}", status));
            return Err(EngineError::CallFailed(message));
        }

        debug!("transfer accepted: {}", payload);
        Ok(payload)
    }
}

/// On-the-fly drive remote for a bearer token.
///
/// rclone connection-string values are single-quoted; a quote inside the
/// value is escaped by doubling it.
fn drive_fs(token: &str, path: &str) -> String {
    let token_json = json!({ "access_token": token }).to_string();
    format!(":drive,token='{}':{}", token_json.replace('\'', "''"), path)
}

/// Destination path for `copyfile`: the configured root joined with the
/// source file's name. rclone addresses the destination relative to the
/// remote's root, so "/" collapses to the bare name.
fn dest_remote(source_path: &str, dest_path: &str) -> String {
    let name = source_path.rsplit('/').next().unwrap_or(source_path);
    let prefix = dest_path.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn error_text(payload: &Value) -> Option<String> {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_fs_embeds_token() {
        let fs = drive_fs("tokA", "");
        assert!(fs.starts_with(":drive,token='"));
        assert!(fs.contains(r#""access_token":"tokA""#));
        assert!(fs.ends_with("':"));
    }

    #[test]
    fn test_drive_fs_escapes_quotes() {
        let fs = drive_fs("to'k", "");
        assert!(!fs.contains("'k"));
        assert!(fs.contains("to''k"));
    }

    #[test]
    fn test_dest_remote_root() {
        assert_eq!(dest_remote("a.txt", "/"), "a.txt");
        assert_eq!(dest_remote("docs/a.txt", "/"), "a.txt");
    }

    #[test]
    fn test_dest_remote_subfolder() {
        assert_eq!(dest_remote("a.txt", "/backup/"), "backup/a.txt");
        assert_eq!(dest_remote("docs/a.txt", "inbox"), "inbox/a.txt");
    }
}
