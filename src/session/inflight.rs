//! In-flight action tracking
//!
//! At most one outstanding call per (action, target). A guard is handed out
//! when the action starts and releases the slot when dropped, whether the call
//! succeeded or failed.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// User-initiated action that talks to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Upload,
    Update,
    Delete,
    Download,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Upload => "upload",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Download => "download",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
pub struct InFlight {
    active: Mutex<HashSet<(Action, String)>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `action` on `target`. None if it is already taken.
    pub fn begin(&self, action: Action, target: &str) -> Option<InFlightGuard<'_>> {
        let key = (action, target.to_string());
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            debug!(action = %action, target = target, "Action already in progress");
            return None;
        }

        Some(InFlightGuard { owner: self, key })
    }

    #[cfg(test)]
    pub fn is_active(&self, action: Action, target: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(action, target.to_string()))
    }
}

/// Releases its slot on drop
pub struct InFlightGuard<'a> {
    owner: &'a InFlight,
    key: (Action, String),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
