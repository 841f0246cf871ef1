use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// Stand-in deadline for delays too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Default)]
struct TimerSlot {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// At most one pending delayed callback. Arming replaces the previous one.
#[derive(Debug)]
pub struct InactivityTimer {
    runtime: Handle,
    slot: Arc<Mutex<TimerSlot>>,
}

impl InactivityTimer {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            slot: Arc::new(Mutex::new(TimerSlot::default())),
        }
    }

    pub fn arm<F>(&self, after: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let deadline = now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE);
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.task.take() {
            previous.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        slot.task = Some(self.runtime.spawn(async move {
            time::sleep_until(deadline).await;
            {
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                slot.task = None;
            }
            callback();
        }));
        let after_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
        debug!(after_ms, generation, "inactivity timer armed");
    }

    /// Idempotent; a superseded timer can no longer fire.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(task) = slot.task.take() {
            task.abort();
            debug!("inactivity timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().task.is_some()
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
