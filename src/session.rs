//! Session handling for the panel: who is signed in, and where to send the
//! browser once the session is gone.

use parking_lot::RwLock;
use tracing::{debug, info};

/// Clears the signed-in session and sends the user back to the entry point.
///
/// Both calls are fire-and-forget; callers never inspect or retry them.
pub trait SessionGate: Send + Sync {
    fn clear_session(&self);
    fn navigate_to_entry_point(&self);
}

/// Session state held by the panel process.
pub struct PanelSession {
    current_user: RwLock<Option<String>>,
    pending_redirect: RwLock<bool>,
    entry_url: String,
}

impl PanelSession {
    pub fn new(user: Option<String>, entry_url: impl Into<String>) -> Self {
        Self {
            current_user: RwLock::new(user),
            pending_redirect: RwLock::new(false),
            entry_url: entry_url.into(),
        }
    }

    pub fn current_user(&self) -> Option<String> {
        self.current_user.read().clone()
    }

    pub fn entry_url(&self) -> &str {
        &self.entry_url
    }

    /// Consume a pending navigation, returning where to redirect to.
    pub fn take_redirect(&self) -> Option<&str> {
        let mut pending = self.pending_redirect.write();
        if *pending {
            *pending = false;
            Some(&self.entry_url)
        } else {
            None
        }
    }
}

impl SessionGate for PanelSession {
    fn clear_session(&self) {
        if let Some(user) = self.current_user.write().take() {
            info!(user = %user, "session cleared");
        }
    }

    fn navigate_to_entry_point(&self) {
        debug!(entry_url = %self.entry_url, "redirect to entry point pending");
        *self.pending_redirect.write() = true;
    }
}
