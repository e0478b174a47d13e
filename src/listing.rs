//! Listing Service Adapter
//!
//! Wraps the engine's listing primitive and normalizes its loose result
//! shape. The engine is untrusted and unstable, so this adapter never raises
//! to its caller: every failure mode collapses into `Listing::error`.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::engine::{DriveSlot, EngineError, TransferEngine};

/// Normalized listing result: always well-formed, whatever the engine did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<String>,
    pub error: Option<String>,
}

impl Listing {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            files: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// One call into the engine per listing; no other side effects.
pub struct ListingService {
    engine: Arc<dyn TransferEngine>,
}

impl ListingService {
    pub fn new(engine: Arc<dyn TransferEngine>) -> Self {
        Self { engine }
    }

    /// Enumerate files visible to `token` in `slot`.
    ///
    /// `token` must be a currently-valid session token for the slot; that is
    /// the caller's responsibility, the engine is the actual validator.
    pub async fn list(&self, slot: DriveSlot, token: &str) -> Listing {
        let outcome = self.engine.list_files(slot, token, "").await;
        let listing = normalize(outcome);
        if let Some(error) = &listing.error {
            warn!("listing for drive {} failed: {}", slot, error);
        }
        listing
    }
}

/// Collapse whatever came back over the boundary into a well-formed listing.
fn normalize(outcome: Result<Value, EngineError>) -> Listing {
    let payload = match outcome {
        Ok(payload) => payload,
        Err(e) => return Listing::failed(e.to_string()),
    };

    let map = match payload.as_object() {
        Some(map) => map,
        None => {
            return Listing::failed(format!(
                "unexpected engine response type ({})",
                type_name(&payload)
            ))
        }
    };

    let files = match map.get("files") {
        // A single entry arrives bare; wrap it as a one-element sequence.
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries.iter().map(entry_name).collect(),
        Some(single) => vec![entry_name(single)],
    };

    let error = map
        .get("error")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Listing { files, error }
}

fn entry_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequence_passes_through() {
        let listing = normalize(Ok(json!({ "files": ["a.txt", "b.txt"] })));
        assert_eq!(listing.files, vec!["a.txt", "b.txt"]);
        assert_eq!(listing.error, None);
    }

    #[test]
    fn test_single_entry_is_wrapped() {
        let listing = normalize(Ok(json!({ "files": "x" })));
        assert_eq!(listing.files, vec!["x"]);
        assert_eq!(listing.error, None);
    }

    #[test]
    fn test_null_files_with_error() {
        let listing = normalize(Ok(json!({ "files": null, "error": "quota exceeded" })));
        assert!(listing.files.is_empty());
        assert_eq!(listing.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_missing_files_field() {
        let listing = normalize(Ok(json!({})));
        assert!(listing.files.is_empty());
        assert_eq!(listing.error, None);
    }

    #[test]
    fn test_non_object_payload_is_reported() {
        let listing = normalize(Ok(json!("oops")));
        assert!(listing.files.is_empty());
        assert!(listing.error.as_deref().unwrap().contains("string"));

        let listing = normalize(Ok(Value::Null));
        assert!(listing.error.as_deref().unwrap().contains("null"));
    }

    #[test]
    fn test_engine_rejection_becomes_error() {
        let listing = normalize(Err(EngineError::Unavailable("no daemon".to_string())));
        assert!(listing.files.is_empty());
        assert!(listing.error.as_deref().unwrap().contains("no daemon"));
    }

    #[test]
    fn test_non_string_entries_are_stringified() {
        let listing = normalize(Ok(json!({ "files": ["a.txt", 7] })));
        assert_eq!(listing.files, vec!["a.txt".to_string(), "7".to_string()]);
    }
}
