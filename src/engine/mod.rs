//! External Engine Boundary
//!
//! All actual provider network I/O is delegated to an external
//! storage-access engine. This module defines the boundary trait the rest of
//! the crate programs against, plus the production rclone implementation.
//!
//! The engine is treated as untrusted: both primitives hand back loose JSON
//! that callers must normalize before use (see `listing::ListingService`).

pub mod rclone;
pub mod types;

pub use rclone::RcloneRcEngine;
pub use types::{DriveSlot, EngineError, TransferRequest, UnknownSlot};

use async_trait::async_trait;
use serde_json::Value;

/// The two boundary primitives the coordinator needs from an engine.
///
/// Implementations perform the real provider calls; the coordinator never
/// talks to a cloud API directly.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Enumerate files visible to `token` under `path_prefix`.
    ///
    /// The happy-path payload is shaped `{ "files": entry | [entries],
    /// "error"?: text }`, but callers must not assume the shape holds.
    async fn list_files(
        &self,
        slot: DriveSlot,
        token: &str,
        path_prefix: &str,
    ) -> Result<Value, EngineError>;

    /// Issue one cross-drive copy and return the engine's immediate
    /// acknowledgment. Completion is not tracked here.
    async fn start_transfer(&self, request: &TransferRequest) -> Result<Value, EngineError>;
}
