//! Transient notifications.
//! Each slot holds at most one toast; a newer toast in the same slot replaces
//! the older one. Toasts disappear once their deadline passes.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToastSlot {
    /// Save confirmations and failures.
    Save,
    /// Group membership changes.
    Group,
    /// Everything else (collaborator failures, exports).
    General,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub slot: ToastSlot,
    pub kind: ToastKind,
    pub message: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct Toasts {
    items: Vec<Toast>,
}

impl Toasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(
        &mut self,
        slot: ToastSlot,
        kind: ToastKind,
        message: impl Into<String>,
        now: Instant,
        ttl: Duration,
    ) {
        self.items.retain(|t| t.slot != slot);
        self.items.push(Toast {
            slot,
            kind,
            message: message.into(),
            expires_at: now + ttl,
        });
    }

    /// Drops toasts whose time is up.
    pub fn expire(&mut self, now: Instant) {
        self.items.retain(|t| now < t.expires_at);
    }

    pub fn active(&self) -> &[Toast] {
        &self.items
    }

    pub fn get(&self, slot: ToastSlot) -> Option<&Toast> {
        self.items.iter().find(|t| t.slot == slot)
    }
}
