//! Attendance session gate.
//!
//! A process-wide two-state machine: recognition runs regardless, but
//! matches only reach the attendance ledger while Active. Deliberately
//! not persisted; every process start begins Idle.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

#[derive(Debug, Default)]
pub struct SessionGate {
    active: AtomicBool,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle → Active. Idempotent: starting an active session stays Active.
    pub fn start(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            tracing::info!("attendance session started");
        }
    }

    /// Active → Idle. Idempotent: stopping an idle session stays Idle.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::info!("attendance session stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        if self.is_active() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }
}
