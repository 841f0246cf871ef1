//! User-interaction events that keep a session alive.
//!
//! The tracker only depends on [`InteractionSource`]; a UI binding (DOM,
//! terminal, window system) is one adapter. [`LocalInteractionSource`] is the
//! in-process adapter used by the CLI and the tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum InteractionKind {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

/// Every kind counts as activity.
pub const TRACKED_INTERACTIONS: [InteractionKind; 6] = [
    InteractionKind::PointerDown,
    InteractionKind::PointerMove,
    InteractionKind::KeyPress,
    InteractionKind::Scroll,
    InteractionKind::TouchStart,
    InteractionKind::Click,
];

pub type InteractionHandler = Arc<dyn Fn(InteractionKind) + Send + Sync>;

pub trait InteractionSource: Send + Sync {
    /// Registering the same handler twice for one kind has no effect.
    fn on_interaction(&self, kind: InteractionKind, handler: InteractionHandler);
    fn off_interaction(&self, kind: InteractionKind, handler: &InteractionHandler);
}

pub(crate) fn same_handler<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[derive(Default)]
pub struct LocalInteractionSource {
    handlers: Mutex<Vec<(InteractionKind, InteractionHandler)>>,
}

impl LocalInteractionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches `kind` to its handlers in registration order.
    pub fn emit(&self, kind: InteractionKind) {
        let targets: Vec<InteractionHandler> = self
            .handlers
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in targets {
            handler(kind);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl InteractionSource for LocalInteractionSource {
    fn on_interaction(&self, kind: InteractionKind, handler: InteractionHandler) {
        let mut guard = self.handlers.lock();
        if guard
            .iter()
            .any(|(k, h)| *k == kind && same_handler(h, &handler))
        {
            return;
        }
        guard.push((kind, handler));
    }

    fn off_interaction(&self, kind: InteractionKind, handler: &InteractionHandler) {
        self.handlers
            .lock()
            .retain(|(k, h)| !(*k == kind && same_handler(h, handler)));
    }
}

impl std::fmt::Debug for LocalInteractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalInteractionSource")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler() -> (InteractionHandler, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let handler: InteractionHandler = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (handler, hits)
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let source = LocalInteractionSource::new();
        let (handler, hits) = counting_handler();
        source.on_interaction(InteractionKind::Click, Arc::clone(&handler));
        source.on_interaction(InteractionKind::Click, Arc::clone(&handler));
        source.emit(InteractionKind::Click);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_only_reaches_matching_kind() {
        let source = LocalInteractionSource::new();
        let (handler, hits) = counting_handler();
        source.on_interaction(InteractionKind::Scroll, handler);
        source.emit(InteractionKind::KeyPress);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        source.emit(InteractionKind::Scroll);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_only_that_kind() {
        let source = LocalInteractionSource::new();
        let (handler, hits) = counting_handler();
        for kind in TRACKED_INTERACTIONS {
            source.on_interaction(kind, Arc::clone(&handler));
        }
        source.off_interaction(InteractionKind::Click, &handler);
        source.emit(InteractionKind::Click);
        source.emit(InteractionKind::PointerMove);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(source.handler_count(), TRACKED_INTERACTIONS.len() - 1);
    }
}
