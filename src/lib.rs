// DriveFerry - Cross-account cloud drive file transfer
// Dual-session coordinator delegating provider I/O to an rclone rcd engine

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod listing;
pub mod selection;
pub mod session;
pub mod status;

pub use config::AppConfig;
pub use coordinator::{CoordinatorError, SlotState, TransferCoordinator};
pub use engine::{DriveSlot, EngineError, RcloneRcEngine, TransferEngine, TransferRequest};
pub use listing::Listing;
pub use status::{StatusArea, StatusEvent};
