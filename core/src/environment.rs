//! Injected environment dependencies.
//!
//! Dependencies with ambient defaults (the system clock) are abstracted
//! behind traits so components receive them explicitly and tests can
//! substitute deterministic implementations.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Production code uses [`SystemClock`]; tests use a fixed clock so that
/// audit timestamps and cluster times are reproducible.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
