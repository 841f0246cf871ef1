//! session-core — encrypted local session store and inactivity tracking
//!
//! # Module layout
//! - `crypto`       — Argon2id key derivation + XChaCha20-Poly1305 record sealing
//! - `backend`      — raw key/value persistence (memory, JSON file)
//! - `store`        — encrypted store with purge-on-unreadable reads
//! - `interaction`  — abstract user-interaction event source
//! - `clock`        — wall-clock sources for activity timestamps
//! - `timer`        — single cancellable inactivity timer
//! - `tracker`      — session predicate, sliding inactivity window, logout fan-out
//! - `guard`        — mount-scoped tracking and route protection
//! - `settings`     — configuration and env overrides
//! - `paths`        — default on-disk locations
//! - `error`        — error types

pub mod backend;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod interaction;
pub mod paths;
pub mod settings;
pub mod store;
pub mod timer;
pub mod tracker;

pub use error::{StoreError, TrackerError};
pub use store::EncryptedStore;
pub use tracker::{ActivityTracker, LogoutListener, TrackerState};
