//! Shared types for the engine boundary
//!
//! Drive slots, transfer requests, and the error type used across the
//! engine trait and its implementations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the two independent drive connection identities.
///
/// The slot letter doubles as the OAuth `state` value, so it round-trips
/// through `Display`/`FromStr` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveSlot {
    /// Source drive ("Drive A")
    A,
    /// Destination drive ("Drive B")
    B,
}

impl DriveSlot {
    /// Both slots, in fixed order.
    pub const ALL: [DriveSlot; 2] = [DriveSlot::A, DriveSlot::B];

    /// Stable array index for per-slot state.
    pub(crate) fn index(self) -> usize {
        match self {
            DriveSlot::A => 0,
            DriveSlot::B => 1,
        }
    }

    /// The slot letter as sent in the authorization `state` parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            DriveSlot::A => "A",
            DriveSlot::B => "B",
        }
    }
}

impl fmt::Display for DriveSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriveSlot {
    type Err = UnknownSlot;

    /// Matches the redirect `state` exactly: `"A"` or `"B"`, nothing else.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(DriveSlot::A),
            "B" => Ok(DriveSlot::B),
            other => Err(UnknownSlot(other.to_string())),
        }
    }
}

/// A `state` value that names no known drive slot.
#[derive(Debug, Clone, Error)]
#[error("unknown drive slot: {0:?}")]
pub struct UnknownSlot(pub String);

/// A single cross-drive copy, built only once both sessions are
/// authenticated and a source file is selected. Consumed immediately by the
/// engine call; never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_token: String,
    pub dest_token: String,
    pub source_path: String,
    pub dest_path: String,
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("source_token", &redact(&self.source_token))
            .field("dest_token", &redact(&self.dest_token))
            .field("source_path", &self.source_path)
            .field("dest_path", &self.dest_path)
            .finish()
    }
}

/// Tokens are opaque secrets; logs only ever see a short prefix.
fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(5).collect();
    format!("{}…", prefix)
}

/// Engine boundary error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine process is not reachable at all.
    #[error("transfer engine unavailable: {0}")]
    Unavailable(String),

    /// The engine was reached but the call failed or returned garbage.
    #[error("engine call failed: {0}")]
    CallFailed(String),
}
