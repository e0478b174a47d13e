//! Transfer Coordinator
//!
//! The dual-session state machine: two OAuth sessions, two listings, one
//! cross-drive selection, and the triggering of exactly one transfer call.
//! Owns the session store and selection tracker behind a single lock so
//! every mutation and every precondition check is atomic; delegates all
//! network I/O to the engine boundary.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::auth::{self, AuthError};
use crate::config::AppConfig;
use crate::engine::{DriveSlot, EngineError, TransferEngine, TransferRequest};
use crate::listing::{Listing, ListingService};
use crate::selection::SelectionTracker;
use crate::session::SessionStore;
use crate::status::{StatusArea, StatusChannel, StatusEvent};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Transfer attempted before both sessions and a source selection exist.
    /// Rejected locally; no engine call is made.
    #[error("please connect both drives and select a file from drive A")]
    PreconditionNotMet,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Combined session-and-selection state of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Disconnected,
    Authenticating,
    Connected { selected: Option<String> },
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Disconnected => write!(f, "disconnected"),
            SlotState::Authenticating => write!(f, "authenticating"),
            SlotState::Connected { selected: None } => write!(f, "connected"),
            SlotState::Connected { selected: Some(file) } => {
                write!(f, "connected, selected {}", file)
            }
        }
    }
}

/// Everything mutable, behind one lock. Mutations happen synchronously
/// inside a single write guard and never straddle an await point.
#[derive(Default)]
struct CoordinatorState {
    sessions: SessionStore,
    selections: SelectionTracker,
    auth_pending: [bool; 2],
}

/// The dual-session transfer coordinator.
pub struct TransferCoordinator {
    config: AppConfig,
    engine: Arc<dyn TransferEngine>,
    listing: ListingService,
    status: StatusChannel,
    state: RwLock<CoordinatorState>,
}

impl TransferCoordinator {
    pub fn new(config: AppConfig, engine: Arc<dyn TransferEngine>) -> Self {
        Self {
            config,
            listing: ListingService::new(engine.clone()),
            engine,
            status: StatusChannel::new(),
            state: RwLock::new(CoordinatorState::default()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Subscribe to status events.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Mark `slot` as authenticating and return the provider authorization
    /// URL. The caller performs the actual navigation (browser launch); the
    /// grant comes back through `complete_auth`.
    pub async fn begin_auth(
        &self,
        slot: DriveSlot,
        redirect_uri: &str,
    ) -> Result<String, CoordinatorError> {
        let url = auth::authorize_url(&self.config, slot, redirect_uri)?;
        {
            let mut state = self.state.write().await;
            state.auth_pending[slot.index()] = true;
        }
        self.status
            .message(StatusArea::Slot(slot), format!("Connecting drive {}...", slot));
        Ok(url)
    }

    /// Apply a redirect fragment. A fragment without a usable grant is
    /// expected noise (a start with no pending redirect) and is silently
    /// ignored, so re-invoking with an already-cleared fragment does
    /// nothing. On a grant: store the token, announce the session, and
    /// refresh the slot's listing.
    pub async fn complete_auth(&self, fragment: &str) -> Option<DriveSlot> {
        let grant = match auth::parse_fragment(fragment) {
            Some(grant) => grant,
            None => {
                debug!("no usable grant in redirect fragment");
                return None;
            }
        };

        let slot = grant.slot;
        {
            let mut state = self.state.write().await;
            state.sessions.set_token(slot, grant.token);
            state.auth_pending[slot.index()] = false;
        }

        info!("drive {} authenticated", slot);
        self.status.publish(StatusEvent::SessionEstablished { slot });
        self.status
            .message(StatusArea::Slot(slot), format!("Drive {} authenticated", slot));

        let _ = self.refresh_listing(slot).await;
        Some(slot)
    }

    /// Disconnect `slot`: clear its token AND its selection in the same
    /// write guard, so a cleared session never leaves a dangling
    /// transfer-eligible choice behind.
    pub async fn disconnect(&self, slot: DriveSlot) {
        {
            let mut state = self.state.write().await;
            state.sessions.clear_token(slot);
            state.selections.clear(slot);
            state.auth_pending[slot.index()] = false;
        }

        info!("drive {} disconnected", slot);
        self.status.publish(StatusEvent::SessionClosed { slot });
        self.status
            .message(StatusArea::Slot(slot), format!("Drive {} disconnected", slot));
        self.status.publish(StatusEvent::FilesUpdated {
            slot,
            files: Vec::new(),
        });
    }

    /// Refresh the listing for `slot` and publish the result.
    ///
    /// The listing is tagged with the session epoch at issue time; if the
    /// session was disconnected or re-established while the engine call was
    /// in flight, the response belongs to a dead incarnation and is
    /// discarded (`None`) without publishing anything.
    pub async fn refresh_listing(&self, slot: DriveSlot) -> Option<Listing> {
        let (token, epoch) = {
            let state = self.state.read().await;
            match state.sessions.token(slot) {
                Some(token) => (token.to_string(), state.sessions.epoch(slot)),
                None => {
                    drop(state);
                    self.status
                        .message(StatusArea::Slot(slot), format!("Drive {} is not connected", slot));
                    return Some(Listing {
                        files: Vec::new(),
                        error: Some(format!("drive {} is not connected", slot)),
                    });
                }
            }
        };

        let listing = self.listing.list(slot, &token).await;

        {
            let state = self.state.read().await;
            if state.sessions.epoch(slot) != epoch {
                debug!("discarding listing for drive {} from a stale session", slot);
                return None;
            }
        }

        if let Some(error) = &listing.error {
            self.status.message(
                StatusArea::Slot(slot),
                format!("Error listing files for drive {}: {}", slot, error),
            );
        }
        self.status.publish(StatusEvent::FilesUpdated {
            slot,
            files: listing.files.clone(),
        });

        Some(listing)
    }

    /// Record `file` as the current selection for `slot`.
    pub async fn select(&self, slot: DriveSlot, file: &str) {
        {
            let mut state = self.state.write().await;
            state.selections.select(slot, file);
        }

        let text = match slot {
            DriveSlot::A => format!("Selected {} from drive A", file),
            DriveSlot::B => format!("Selected {} in drive B", file),
        };
        self.status.publish(StatusEvent::SelectionChanged {
            slot,
            file: file.to_string(),
        });
        self.status.message(StatusArea::Global, text);
    }

    /// Transfer eligibility, recomputed from live state on every call.
    pub async fn transfer_ready(&self) -> bool {
        let state = self.state.read().await;
        state.sessions.is_authenticated(DriveSlot::A)
            && state.sessions.is_authenticated(DriveSlot::B)
            && state.selections.selection(DriveSlot::A).is_some()
    }

    /// Issue the transfer.
    ///
    /// Preconditions (both tokens plus a source selection) are checked
    /// atomically under one read guard; on failure no engine call is made.
    /// On success exactly one `start_transfer` call goes out and whatever
    /// immediate acknowledgment the engine returns is reported. An engine
    /// failure is surfaced as status text and leaves the coordinator usable
    /// for another attempt.
    pub async fn transfer(&self) -> Result<Value, CoordinatorError> {
        let request = {
            let state = self.state.read().await;
            let source_token = state.sessions.token(DriveSlot::A);
            let dest_token = state.sessions.token(DriveSlot::B);
            let source_path = state.selections.selection(DriveSlot::A);

            match (source_token, dest_token, source_path) {
                (Some(source_token), Some(dest_token), Some(source_path)) => TransferRequest {
                    source_token: source_token.to_string(),
                    dest_token: dest_token.to_string(),
                    source_path: source_path.to_string(),
                    dest_path: self.config.dest_root.clone(),
                },
                _ => {
                    self.status.message(
                        StatusArea::Global,
                        "Please connect both drives and select a file from drive A",
                    );
                    return Err(CoordinatorError::PreconditionNotMet);
                }
            }
        };

        self.status.message(
            StatusArea::Global,
            format!("Transferring {} to {}...", request.source_path, request.dest_path),
        );

        match self.engine.start_transfer(&request).await {
            Ok(ack) => {
                info!("transfer accepted: {:?}", request);
                self.status.publish(StatusEvent::TransferStarted {
                    source_path: request.source_path.clone(),
                    dest_path: request.dest_path.clone(),
                });
                let text = match ack.get("jobid") {
                    Some(id) => format!("Transfer of {} started (job {})", request.source_path, id),
                    None => format!("Transfer of {} started", request.source_path),
                };
                self.status.message(StatusArea::Global, text);
                Ok(ack)
            }
            Err(e) => {
                self.status
                    .message(StatusArea::Global, format!("Transfer failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Combined state of one slot, per the session/selection state machine.
    pub async fn slot_state(&self, slot: DriveSlot) -> SlotState {
        let state = self.state.read().await;
        if state.sessions.is_authenticated(slot) {
            SlotState::Connected {
                selected: state.selections.selection(slot).map(str::to_string),
            }
        } else if state.auth_pending[slot.index()] {
            SlotState::Authenticating
        } else {
            SlotState::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    struct Gates {
        entered: Notify,
        release: Notify,
    }

    /// Recording engine double. Listing calls after the first can be gated
    /// so a test can disconnect the session while a call is in flight.
    struct MockEngine {
        listing: Value,
        fail_transfer: AtomicBool,
        list_calls: AtomicUsize,
        transfers: StdMutex<Vec<TransferRequest>>,
        gates: Option<Gates>,
    }

    impl MockEngine {
        fn new(listing: Value) -> Self {
            Self {
                listing,
                fail_transfer: AtomicBool::new(false),
                list_calls: AtomicUsize::new(0),
                transfers: StdMutex::new(Vec::new()),
                gates: None,
            }
        }

        fn gated(listing: Value) -> Self {
            Self {
                gates: Some(Gates {
                    entered: Notify::new(),
                    release: Notify::new(),
                }),
                ..Self::new(listing)
            }
        }

        fn transfer_calls(&self) -> Vec<TransferRequest> {
            self.transfers.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransferEngine for MockEngine {
        async fn list_files(
            &self,
            _slot: DriveSlot,
            _token: &str,
            _path_prefix: &str,
        ) -> Result<Value, EngineError> {
            let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gates) = &self.gates {
                if call > 0 {
                    gates.entered.notify_one();
                    gates.release.notified().await;
                }
            }
            Ok(self.listing.clone())
        }

        async fn start_transfer(&self, request: &TransferRequest) -> Result<Value, EngineError> {
            self.transfers.lock().unwrap().push(request.clone());
            if self.fail_transfer.load(Ordering::SeqCst) {
                return Err(EngineError::CallFailed("engine exploded".to_string()));
            }
            Ok(json!({ "jobid": 1 }))
        }
    }

    fn coordinator_with(engine: Arc<MockEngine>) -> TransferCoordinator {
        TransferCoordinator::new(AppConfig::default(), engine)
    }

    async fn connect(coordinator: &TransferCoordinator, slot: DriveSlot, token: &str) {
        let fragment = format!("access_token={}&state={}", token, slot);
        assert_eq!(coordinator.complete_auth(&fragment).await, Some(slot));
    }

    #[tokio::test]
    async fn test_complete_auth_establishes_session_and_lists() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt", "b.txt"] })));
        let coordinator = coordinator_with(engine.clone());
        let mut rx = coordinator.subscribe();

        connect(&coordinator, DriveSlot::A, "tok1").await;

        assert_eq!(
            coordinator.slot_state(DriveSlot::A).await,
            SlotState::Connected { selected: None }
        );
        assert_eq!(engine.list_calls.load(Ordering::SeqCst), 1);

        // Session event first, then the listing for exactly that slot.
        let mut saw_session = false;
        let mut files = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                StatusEvent::SessionEstablished { slot } => {
                    assert_eq!(slot, DriveSlot::A);
                    saw_session = true;
                }
                StatusEvent::FilesUpdated { slot, files: f } => {
                    assert_eq!(slot, DriveSlot::A);
                    files = Some(f);
                }
                _ => {}
            }
        }
        assert!(saw_session);
        assert_eq!(files.unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_fragment_noise_is_a_noop() {
        let engine = Arc::new(MockEngine::new(json!({ "files": [] })));
        let coordinator = coordinator_with(engine.clone());
        let mut rx = coordinator.subscribe();

        assert_eq!(coordinator.complete_auth("").await, None);
        assert_eq!(coordinator.complete_auth("access_token=tok").await, None);
        assert_eq!(coordinator.complete_auth("access_token=tok&state=Z").await, None);

        assert_eq!(coordinator.slot_state(DriveSlot::A).await, SlotState::Disconnected);
        assert_eq!(engine.list_calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transfer_rejected_without_dest_session() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt"] })));
        let coordinator = coordinator_with(engine.clone());

        connect(&coordinator, DriveSlot::A, "tokA").await;
        coordinator.select(DriveSlot::A, "a.txt").await;
        assert!(!coordinator.transfer_ready().await);

        let result = coordinator.transfer().await;
        assert!(matches!(result, Err(CoordinatorError::PreconditionNotMet)));
        assert!(engine.transfer_calls().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_rejected_without_selection() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt"] })));
        let coordinator = coordinator_with(engine.clone());

        connect(&coordinator, DriveSlot::A, "tokA").await;
        connect(&coordinator, DriveSlot::B, "tokB").await;
        // A selection in B alone is informational and never enables transfer.
        coordinator.select(DriveSlot::B, "notes.md").await;

        let result = coordinator.transfer().await;
        assert!(matches!(result, Err(CoordinatorError::PreconditionNotMet)));
        assert!(engine.transfer_calls().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_issues_exactly_one_engine_call() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt"] })));
        let coordinator = coordinator_with(engine.clone());

        connect(&coordinator, DriveSlot::A, "tokA").await;
        connect(&coordinator, DriveSlot::B, "tokB").await;
        coordinator.select(DriveSlot::A, "a.txt").await;
        assert!(coordinator.transfer_ready().await);

        let ack = coordinator.transfer().await.unwrap();
        assert_eq!(ack, json!({ "jobid": 1 }));

        let calls = engine.transfer_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            TransferRequest {
                source_token: "tokA".to_string(),
                dest_token: "tokB".to_string(),
                source_path: "a.txt".to_string(),
                dest_path: "/".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_selections_do_not_cross_slots() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt"] })));
        let coordinator = coordinator_with(engine);

        connect(&coordinator, DriveSlot::A, "tokA").await;
        coordinator.select(DriveSlot::A, "a.txt").await;
        coordinator.select(DriveSlot::B, "other.bin").await;

        assert_eq!(
            coordinator.slot_state(DriveSlot::A).await,
            SlotState::Connected {
                selected: Some("a.txt".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_invalidates_selection() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt"] })));
        let coordinator = coordinator_with(engine.clone());

        connect(&coordinator, DriveSlot::A, "tokA").await;
        connect(&coordinator, DriveSlot::B, "tokB").await;
        coordinator.select(DriveSlot::A, "a.txt").await;

        coordinator.disconnect(DriveSlot::A).await;
        assert_eq!(coordinator.slot_state(DriveSlot::A).await, SlotState::Disconnected);
        // B's session survives A's disconnect.
        assert_eq!(
            coordinator.slot_state(DriveSlot::B).await,
            SlotState::Connected { selected: None }
        );

        let result = coordinator.transfer().await;
        assert!(matches!(result, Err(CoordinatorError::PreconditionNotMet)));
        assert!(engine.transfer_calls().is_empty());

        // Reconnecting A without re-selecting must not resurrect the old choice.
        connect(&coordinator, DriveSlot::A, "tokA2").await;
        assert!(!coordinator.transfer_ready().await);
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_coordinator_usable() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt"] })));
        let coordinator = coordinator_with(engine.clone());

        connect(&coordinator, DriveSlot::A, "tokA").await;
        connect(&coordinator, DriveSlot::B, "tokB").await;
        coordinator.select(DriveSlot::A, "a.txt").await;

        engine.fail_transfer.store(true, Ordering::SeqCst);
        assert!(matches!(
            coordinator.transfer().await,
            Err(CoordinatorError::Engine(_))
        ));

        engine.fail_transfer.store(false, Ordering::SeqCst);
        assert!(coordinator.transfer().await.is_ok());
        assert_eq!(engine.transfer_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_listing_is_discarded() {
        let engine = Arc::new(MockEngine::gated(json!({ "files": ["a.txt"] })));
        let coordinator = Arc::new(TransferCoordinator::new(
            AppConfig::default(),
            engine.clone() as Arc<dyn TransferEngine>,
        ));

        // First listing (inside complete_auth) passes ungated.
        connect(&coordinator, DriveSlot::A, "tok1").await;

        let mut rx = coordinator.subscribe();
        let worker = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh_listing(DriveSlot::A).await })
        };

        // Wait until the listing call is in flight, then kill its session.
        engine.gates.as_ref().unwrap().entered.notified().await;
        coordinator.disconnect(DriveSlot::A).await;
        engine.gates.as_ref().unwrap().release.notify_one();

        assert_eq!(worker.await.unwrap(), None);

        // The stale response published nothing: every FilesUpdated seen
        // after the disconnect is the empty one the disconnect itself emits.
        while let Ok(event) = rx.try_recv() {
            if let StatusEvent::FilesUpdated { files, .. } = event {
                assert!(files.is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_refresh_listing_without_session() {
        let engine = Arc::new(MockEngine::new(json!({ "files": ["a.txt"] })));
        let coordinator = coordinator_with(engine.clone());

        let listing = coordinator.refresh_listing(DriveSlot::A).await.unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.error.unwrap().contains("not connected"));
        assert_eq!(engine.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_begin_auth_marks_slot_authenticating() {
        let engine = Arc::new(MockEngine::new(json!({ "files": [] })));
        let coordinator = coordinator_with(engine);

        let url = coordinator
            .begin_auth(DriveSlot::B, "http://127.0.0.1:8185/")
            .await
            .unwrap();
        assert!(url.contains("state=B"));
        assert_eq!(
            coordinator.slot_state(DriveSlot::B).await,
            SlotState::Authenticating
        );
    }
}
