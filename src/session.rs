//! Session Store - Per-slot authentication state
//!
//! Holds at most one access token per drive slot. Pure state, no I/O; the
//! coordinator owns the lock around it.
//!
//! Every mutation bumps the slot's epoch, which lets in-flight listings be
//! matched against the session incarnation they were issued for.

use crate::engine::DriveSlot;

#[derive(Debug, Default, Clone)]
struct SlotSession {
    token: Option<String>,
    epoch: u64,
}

/// Token cell for both drive slots.
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: [SlotSession; 2],
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session for `slot`. Last writer wins; there is only ever
    /// one writer (the authentication flow). `token` must be non-empty.
    pub fn set_token(&mut self, slot: DriveSlot, token: impl Into<String>) {
        let token = token.into();
        debug_assert!(!token.is_empty(), "session tokens are non-empty");
        let cell = &mut self.slots[slot.index()];
        cell.token = Some(token);
        cell.epoch += 1;
    }

    /// Disconnect `slot`. Idempotent; a fresh epoch is minted either way so
    /// late responses from the old incarnation can be recognized.
    pub fn clear_token(&mut self, slot: DriveSlot) {
        let cell = &mut self.slots[slot.index()];
        cell.token = None;
        cell.epoch += 1;
    }

    /// Current token, or absent when disconnected. Side-effect-free.
    pub fn token(&self, slot: DriveSlot) -> Option<&str> {
        self.slots[slot.index()].token.as_deref()
    }

    pub fn is_authenticated(&self, slot: DriveSlot) -> bool {
        self.token(slot).is_some()
    }

    /// Incarnation counter for `slot`; moves on every set/clear.
    pub fn epoch(&self, slot: DriveSlot) -> u64 {
        self.slots[slot.index()].epoch
    }
}
