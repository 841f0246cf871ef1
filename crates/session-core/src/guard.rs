//! Mount-scoped session tracking and route protection.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::tracker::{ActivityTracker, LogoutListener};

pub const SIGN_IN_PATH: &str = "/signin";
pub const SIGN_UP_PATH: &str = "/signup";

/// Keeps a tracker running for as long as the guard is alive.
///
/// Dropping the guard stops tracking and unsubscribes its logout callback,
/// the same cleanup a screen performs when it unmounts.
#[must_use = "tracking stops as soon as the guard is dropped"]
pub struct ActivityGuard {
    tracker: ActivityTracker,
    on_logout: LogoutListener,
}

impl ActivityGuard {
    /// Returns `None` when there is no session to track. If the stored
    /// session is already past its inactivity window, `on_forced_logout`
    /// runs immediately instead.
    pub fn mount(tracker: &ActivityTracker, on_forced_logout: LogoutListener) -> Option<Self> {
        if !tracker.is_authenticated() {
            return None;
        }
        if tracker.is_session_expired() {
            on_forced_logout();
            return None;
        }
        if let Err(err) = tracker.initialize() {
            warn!(error = %err, "activity tracking could not start");
        }
        tracker.subscribe(Arc::clone(&on_forced_logout));
        Some(Self {
            tracker: tracker.clone(),
            on_logout: on_forced_logout,
        })
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.tracker.stop();
        self.tracker.unsubscribe(&self.on_logout);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteAccess {
    Allow,
    Redirect {
        to: String,
        /// Where to send the user back to after signing in.
        return_to: Option<String>,
    },
}

pub fn check_route(tracker: &ActivityTracker, path: &str) -> RouteAccess {
    if tracker.is_authenticated() {
        return RouteAccess::Allow;
    }
    let return_to = if path.contains(SIGN_IN_PATH) || path.contains(SIGN_UP_PATH) {
        None
    } else {
        Some(path.to_string())
    };
    RouteAccess::Redirect {
        to: SIGN_IN_PATH.to_string(),
        return_to,
    }
}
