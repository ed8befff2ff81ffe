//! Logout reasons and the hand-off slot read by the next screen.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Why the client left the authenticated state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The bearer's own lifetime ran out
    Expired,
    /// The server reported the session as no longer current
    KickedOut,
}

impl LogoutReason {
    pub fn message(&self) -> &'static str {
        match self {
            LogoutReason::Expired => "Your session has expired. Please sign in again.",
            LogoutReason::KickedOut => {
                "Your session was ended because this account signed in elsewhere."
            }
        }
    }
}

/// Single-value slot holding the reason until someone reads it once.
#[derive(Debug, Default)]
pub struct ReasonSlot {
    reason: Mutex<Option<LogoutReason>>,
}

impl ReasonSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stash(&self, reason: LogoutReason) {
        *self.reason.lock() = Some(reason);
    }

    /// Read and clear
    pub fn take(&self) -> Option<LogoutReason> {
        self.reason.lock().take()
    }
}
