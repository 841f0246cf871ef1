//! Activity/session tracker.
//!
//! Authentication is derived from the store: a session exists exactly when
//! the user record decrypts to a non-null value. While tracking, every
//! interaction refreshes the `lastActivity` timestamp and pushes the
//! inactivity deadline out again (sliding window). When the deadline passes
//! the tracker logs out and notifies its listeners.

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, TrackerError};
use crate::interaction::{
    same_handler, InteractionHandler, InteractionKind, InteractionSource, TRACKED_INTERACTIONS,
};
use crate::settings::SessionSettings;
use crate::store::EncryptedStore;
use crate::timer::InactivityTimer;

pub type LogoutListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerState {
    Inactive,
    Tracking,
}

struct TrackerInner {
    store: EncryptedStore,
    source: Arc<dyn InteractionSource>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    timer: InactivityTimer,
    handler: InteractionHandler,
    attached: AtomicBool,
    listeners: Mutex<Vec<LogoutListener>>,
    /// Held across "check session, record, arm" and across logout's purge.
    /// Reentrant because listeners and clocks may call back into the tracker.
    session: ReentrantMutex<()>,
    /// Bumped by every logout.
    epoch: AtomicU64,
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct ActivityTracker {
    inner: Arc<TrackerInner>,
}

impl ActivityTracker {
    /// Must be called from within a tokio runtime; the inactivity timer
    /// runs on it.
    pub fn new(
        store: EncryptedStore,
        source: Arc<dyn InteractionSource>,
        settings: SessionSettings,
    ) -> Result<Self, TrackerError> {
        Self::with_clock(store, source, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: EncryptedStore,
        source: Arc<dyn InteractionSource>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TrackerError> {
        let runtime = Handle::try_current().map_err(|_| TrackerError::NoRuntime)?;
        let inner = Arc::new_cyclic(|weak: &Weak<TrackerInner>| {
            let weak = weak.clone();
            let handler: InteractionHandler = Arc::new(move |kind: InteractionKind| {
                if let Some(inner) = weak.upgrade() {
                    ActivityTracker { inner }.handle_interaction(kind);
                }
            });
            TrackerInner {
                store,
                source,
                clock,
                settings,
                timer: InactivityTimer::new(runtime),
                handler,
                attached: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                session: ReentrantMutex::new(()),
                epoch: AtomicU64::new(0),
            }
        });
        Ok(Self { inner })
    }

    pub fn store(&self) -> &EncryptedStore {
        &self.inner.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> TrackerState {
        if self.inner.attached.load(Ordering::SeqCst) {
            TrackerState::Tracking
        } else {
            TrackerState::Inactive
        }
    }

    pub fn timer_armed(&self) -> bool {
        self.inner.timer.is_armed()
    }

    /// Stores the user record handed over by the sign-in flow and starts
    /// its activity clock.
    pub fn login<T: Serialize + ?Sized>(&self, user: &T) -> Result<(), StoreError> {
        let _session = self.inner.session.lock();
        self.inner.store.set_item(&self.inner.settings.user_key, user)?;
        self.record_activity()?;
        info!("user session stored");
        Ok(())
    }

    pub fn user_data(&self) -> Option<Value> {
        match self.inner.store.get_item(&self.inner.settings.user_key) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "reading user record failed");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.user_data(), Some(value) if !value.is_null())
    }

    /// `name`, then `username`, then "User".
    pub fn user_name(&self) -> String {
        let user = self.user_data();
        non_empty_field(user.as_ref(), "name")
            .or_else(|| non_empty_field(user.as_ref(), "username"))
            .unwrap_or_else(|| "User".to_string())
    }

    pub fn user_email(&self) -> Option<String> {
        non_empty_field(self.user_data().as_ref(), "email")
    }

    pub fn last_activity(&self) -> Option<i64> {
        match self
            .inner
            .store
            .get_item_as::<i64>(&self.inner.settings.activity_key)
        {
            Ok(ts) => ts,
            Err(err) => {
                warn!(error = %err, "reading activity timestamp failed");
                None
            }
        }
    }

    pub fn is_session_expired(&self) -> bool {
        let Some(last) = self.last_activity() else {
            return false;
        };
        let idle = self.inner.clock.now_millis().saturating_sub(last);
        idle > timeout_millis(&self.inner.settings)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        let session = self.inner.session.lock();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        if !self.is_authenticated() {
            return Ok(());
        }
        if self.is_session_expired() {
            drop(session);
            info!("session expired while away; logging out");
            self.logout();
            return Ok(());
        }
        self.record_activity()?;
        self.arm_timer();
        if self.logged_out_since(epoch) {
            return Ok(());
        }
        self.attach();
        info!(
            timeout_ms = self.inner.settings.inactivity_timeout_ms,
            "activity tracking started"
        );
        Ok(())
    }

    /// Cancels the timer and detaches interaction handlers. Idempotent.
    pub fn stop(&self) {
        self.inner.timer.cancel();
        for kind in TRACKED_INTERACTIONS {
            self.inner.source.off_interaction(kind, &self.inner.handler);
        }
        if self.inner.attached.swap(false, Ordering::SeqCst) {
            debug!("activity tracking stopped");
        }
    }

    /// Clears the session records, cancels the timer and notifies listeners
    /// in subscription order. Interaction handlers stay attached; use
    /// [`ActivityTracker::sign_out`] to tear both down.
    ///
    /// Storage failures are logged; the timer is cancelled and listeners run
    /// regardless.
    pub fn logout(&self) {
        {
            let _session = self.inner.session.lock();
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            let settings = &self.inner.settings;
            for key in [&settings.user_key, &settings.activity_key] {
                if let Err(err) = self.inner.store.remove_item(key) {
                    warn!(key = %key, error = %err, "failed to clear session record");
                }
            }
            self.inner.timer.cancel();
        }
        let listeners = self.inner.listeners.lock().clone();
        for listener in listeners {
            listener();
        }
        info!("user logged out");
    }

    pub fn sign_out(&self) {
        self.stop();
        self.logout();
    }

    pub fn subscribe(&self, listener: LogoutListener) {
        self.inner.listeners.lock().push(listener);
    }

    /// Removes the first registration of `listener`, if any.
    pub fn unsubscribe(&self, listener: &LogoutListener) {
        let mut listeners = self.inner.listeners.lock();
        if let Some(index) = listeners.iter().position(|l| same_handler(l, listener)) {
            listeners.remove(index);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn handle_interaction(&self, kind: InteractionKind) {
        let _session = self.inner.session.lock();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        if !self.is_authenticated() {
            return;
        }
        if let Err(err) = self.record_activity() {
            warn!(?kind, error = %err, "failed to record activity");
        }
        self.arm_timer();
        self.logged_out_since(epoch);
    }

    /// Undoes a just-recorded activity if a logout ran in the meantime
    /// (from a callback on this thread; other threads wait on the lock).
    fn logged_out_since(&self, epoch: u64) -> bool {
        if self.inner.epoch.load(Ordering::SeqCst) == epoch {
            return false;
        }
        debug!("session ended while recording activity; discarding it");
        self.inner.timer.cancel();
        if let Err(err) = self
            .inner
            .store
            .remove_item(&self.inner.settings.activity_key)
        {
            warn!(error = %err, "failed to clear activity timestamp");
        }
        true
    }

    fn record_activity(&self) -> Result<(), StoreError> {
        let now = self.inner.clock.now_millis();
        self.inner
            .store
            .set_item(&self.inner.settings.activity_key, &now)
    }

    fn arm_timer(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .timer
            .arm(self.inner.settings.inactivity_timeout(), move || {
                if let Some(inner) = weak.upgrade() {
                    ActivityTracker { inner }.on_timeout();
                }
            });
    }

    fn attach(&self) {
        for kind in TRACKED_INTERACTIONS {
            self.inner
                .source
                .on_interaction(kind, Arc::clone(&self.inner.handler));
        }
        self.inner.attached.store(true, Ordering::SeqCst);
    }

    fn on_timeout(&self) {
        info!(
            timeout_ms = self.inner.settings.inactivity_timeout_ms,
            "user inactive, logging out"
        );
        self.logout();
        self.stop();
    }
}

impl std::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("state", &self.state())
            .field("timer_armed", &self.timer_armed())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn timeout_millis(settings: &SessionSettings) -> i64 {
    i64::try_from(settings.inactivity_timeout_ms).unwrap_or(i64::MAX)
}

fn non_empty_field(user: Option<&Value>, field: &str) -> Option<String> {
    user?
        .get(field)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
