use serde_json::json;
use session_core::backend::{MemoryBackend, StorageBackend};
use session_core::clock::{Clock, ManualClock};
use session_core::crypto::{StoreKey, DERIVED_KEY_LEN};
use session_core::interaction::{InteractionKind, LocalInteractionSource};
use session_core::settings::SessionSettings;
use session_core::{ActivityTracker, EncryptedStore, LogoutListener, StoreError, TrackerState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HOUR_MS: i64 = 60 * 60 * 1000;
const START_MS: i64 = 1_700_000_000_000;

struct Fixture {
    tracker: ActivityTracker,
    source: Arc<LocalInteractionSource>,
    clock: ManualClock,
}

fn build(
    backend: Box<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
) -> (ActivityTracker, Arc<LocalInteractionSource>) {
    let store = EncryptedStore::new(backend, StoreKey::from_bytes([42; DERIVED_KEY_LEN]));
    let source = Arc::new(LocalInteractionSource::new());
    let tracker =
        ActivityTracker::with_clock(store, source.clone(), SessionSettings::default(), clock)
            .unwrap();
    (tracker, source)
}

fn fixture() -> Fixture {
    let clock = ManualClock::new(START_MS);
    let (tracker, source) = build(Box::new(MemoryBackend::new()), Arc::new(clock.clone()));
    Fixture {
        tracker,
        source,
        clock,
    }
}

/// Accepts writes but refuses to delete anything.
struct UndeletableBackend(MemoryBackend);

impl StorageBackend for UndeletableBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.0.set(key, value)
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("store is read-only".into()))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.0.keys()
    }
}

/// Runs `logout(); stop()` on the held tracker the next time the time is
/// read, the way an expiring timer would if it fired mid-interaction.
struct ExpiringClock {
    inner: ManualClock,
    pending: Mutex<Option<ActivityTracker>>,
}

impl Clock for ExpiringClock {
    fn now_millis(&self) -> i64 {
        let pending = self.pending.lock().unwrap().take();
        if let Some(tracker) = pending {
            tracker.logout();
            tracker.stop();
        }
        self.inner.now_millis()
    }
}

fn counting_listener() -> (LogoutListener, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let listener: LogoutListener = Arc::new(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (listener, hits)
}

fn sign_in(fx: &Fixture) {
    fx.tracker
        .login(&json!({"id": 7, "name": "Ada", "email": "ada@example.com"}))
        .unwrap();
}

#[tokio::test]
async fn no_timestamp_is_not_expired() {
    let fx = fixture();
    assert_eq!(fx.tracker.last_activity(), None);
    assert!(!fx.tracker.is_session_expired());
}

#[tokio::test]
async fn expiry_boundary_is_strict() {
    let fx = fixture();
    let key = fx.tracker.settings().activity_key.clone();

    fx.tracker.store().set_item(&key, &(START_MS - HOUR_MS)).unwrap();
    assert!(!fx.tracker.is_session_expired());

    fx.tracker.store().set_item(&key, &(START_MS - HOUR_MS - 1)).unwrap();
    assert!(fx.tracker.is_session_expired());
}

#[tokio::test]
async fn unreadable_timestamp_is_not_expired() {
    let fx = fixture();
    let key = fx.tracker.settings().activity_key.clone();
    fx.tracker.store().set_raw(&key, "corrupted").unwrap();
    assert!(!fx.tracker.is_session_expired());
    assert!(!fx.tracker.store().contains(&key).unwrap());
}

#[tokio::test]
async fn initialize_without_session_does_nothing() {
    let fx = fixture();
    fx.tracker.initialize().unwrap();

    assert_eq!(fx.tracker.state(), TrackerState::Inactive);
    assert!(!fx.tracker.timer_armed());
    assert_eq!(fx.source.handler_count(), 0);

    fx.source.emit(InteractionKind::KeyPress);
    fx.source.emit(InteractionKind::Click);
    assert!(fx.tracker.store().keys().unwrap().is_empty());
}

#[tokio::test]
async fn initialize_arms_and_records_activity() {
    let fx = fixture();
    sign_in(&fx);
    fx.tracker.initialize().unwrap();

    assert_eq!(fx.tracker.state(), TrackerState::Tracking);
    assert!(fx.tracker.timer_armed());
    assert_eq!(fx.tracker.last_activity(), Some(START_MS));
    assert_eq!(fx.source.handler_count(), 6);

    fx.clock.advance(5_000);
    fx.source.emit(InteractionKind::PointerMove);
    assert_eq!(fx.tracker.last_activity(), Some(START_MS + 5_000));
}

#[tokio::test]
async fn initialize_twice_does_not_duplicate_handlers() {
    let fx = fixture();
    sign_in(&fx);
    fx.tracker.initialize().unwrap();
    fx.tracker.initialize().unwrap();
    assert_eq!(fx.source.handler_count(), 6);
}

#[tokio::test]
async fn stale_session_is_logged_out_on_initialize() {
    let fx = fixture();
    sign_in(&fx);
    let key = fx.tracker.settings().activity_key.clone();
    fx.tracker
        .store()
        .set_item(&key, &(START_MS - 2 * HOUR_MS))
        .unwrap();
    let (listener, hits) = counting_listener();
    fx.tracker.subscribe(listener);

    fx.tracker.initialize().unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!fx.tracker.is_authenticated());
    assert!(!fx.tracker.timer_armed());
    assert_eq!(fx.tracker.state(), TrackerState::Inactive);
    assert!(fx.tracker.store().keys().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn inactivity_window_slides_with_interaction() {
    let fx = fixture();
    sign_in(&fx);
    let (listener, hits) = counting_listener();
    fx.tracker.subscribe(listener);
    fx.tracker.initialize().unwrap();

    tokio::time::sleep(Duration::from_secs(1800)).await;
    fx.source.emit(InteractionKind::KeyPress);

    tokio::time::sleep(Duration::from_secs(2160)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(fx.tracker.is_authenticated());

    tokio::time::sleep(Duration::from_secs(1500)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!fx.tracker.is_authenticated());
    assert_eq!(fx.tracker.state(), TrackerState::Inactive);
    assert_eq!(fx.source.handler_count(), 0);

    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_clears_records_and_notifies_in_order() {
    let fx = fixture();
    sign_in(&fx);
    fx.tracker.initialize().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    for id in 1..=3 {
        let order = Arc::clone(&order);
        fx.tracker.subscribe(Arc::new(move || order.lock().unwrap().push(id)));
    }

    fx.tracker.logout();

    let settings = fx.tracker.settings().clone();
    assert!(!fx.tracker.store().contains(&settings.user_key).unwrap());
    assert!(!fx.tracker.store().contains(&settings.activity_key).unwrap());
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    assert!(!fx.tracker.timer_armed());

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn logout_keeps_handlers_until_stopped() {
    let fx = fixture();
    sign_in(&fx);
    fx.tracker.initialize().unwrap();
    fx.tracker.logout();

    assert_eq!(fx.source.handler_count(), 6);
    fx.source.emit(InteractionKind::Scroll);
    assert!(fx.tracker.store().keys().unwrap().is_empty());
    assert!(!fx.tracker.timer_armed());

    fx.tracker.stop();
    fx.tracker.stop();
    assert_eq!(fx.source.handler_count(), 0);
    assert_eq!(fx.tracker.state(), TrackerState::Inactive);
}

#[tokio::test]
async fn sign_out_tears_everything_down() {
    let fx = fixture();
    sign_in(&fx);
    fx.tracker.initialize().unwrap();
    let (listener, hits) = counting_listener();
    fx.tracker.subscribe(listener);

    fx.tracker.sign_out();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(fx.source.handler_count(), 0);
    assert_eq!(fx.tracker.state(), TrackerState::Inactive);
    assert!(!fx.tracker.is_authenticated());
}

#[tokio::test]
async fn corrupted_session_looks_logged_out() {
    let fx = fixture();
    let key = fx.tracker.settings().user_key.clone();
    fx.tracker.store().set_raw(&key, "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();

    assert!(!fx.tracker.is_authenticated());
    assert!(!fx.tracker.store().contains(&key).unwrap());
    fx.tracker.initialize().unwrap();
    assert_eq!(fx.tracker.state(), TrackerState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn dropping_tracker_cancels_pending_timer() {
    let fx = fixture();
    sign_in(&fx);
    let (listener, hits) = counting_listener();
    fx.tracker.subscribe(listener);
    fx.tracker.initialize().unwrap();

    let Fixture { tracker, source, .. } = fx;
    drop(tracker);
    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // handlers left behind by a dropped tracker are inert
    source.emit(InteractionKind::Click);
}

#[tokio::test(start_paused = true)]
async fn logout_during_interaction_is_not_undone() {
    let clock = Arc::new(ExpiringClock {
        inner: ManualClock::new(START_MS),
        pending: Mutex::new(None),
    });
    let (tracker, source) = build(Box::new(MemoryBackend::new()), clock.clone());
    tracker.login(&json!({"name": "Ada"})).unwrap();
    let (listener, hits) = counting_listener();
    tracker.subscribe(listener);
    tracker.initialize().unwrap();

    *clock.pending.lock().unwrap() = Some(tracker.clone());
    source.emit(InteractionKind::KeyPress);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!tracker.is_authenticated());
    assert_eq!(tracker.last_activity(), None);
    assert!(!tracker.timer_armed());
    assert_eq!(source.handler_count(), 0);

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logout_finishes_when_records_cannot_be_deleted() {
    let (tracker, source) = build(
        Box::new(UndeletableBackend(MemoryBackend::new())),
        Arc::new(ManualClock::new(START_MS)),
    );
    tracker.login(&json!({"name": "Ada"})).unwrap();
    tracker.initialize().unwrap();
    let (listener, hits) = counting_listener();
    tracker.subscribe(listener);

    tracker.logout();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!tracker.timer_armed());
    // the records are still there, so handlers stay live until stopped
    assert_eq!(source.handler_count(), 6);
    tracker.stop();
    assert_eq!(source.handler_count(), 0);
}
