//! Accumulation of session changes and telemetry between drains.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::session::{SessionSnapshot, TelemetryRecord};

#[derive(Debug, Default)]
struct Accumulators {
    sessions: Vec<SessionSnapshot>,
    telemetry: Vec<TelemetryRecord>,
}

/// Counts of records waiting for the next drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub sessions: usize,
    pub telemetry: usize,
}

/// Two append-only streams, handed off by swapping in an empty buffer.
///
/// Both streams share a single mutex. The registry records from the hub task
/// and the scheduler takes from its own task; a take returns every item
/// recorded since the previous take of that stream, in recording order.
#[derive(Debug, Default)]
pub struct EventBatcher {
    inner: Mutex<Accumulators>,
}

impl EventBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a Vec half-pushed, so a
    // poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, Accumulators> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_session_change(&self, snapshot: SessionSnapshot) {
        self.lock().sessions.push(snapshot);
    }

    pub fn record_telemetry(&self, record: TelemetryRecord) {
        self.lock().telemetry.push(record);
    }

    /// Take all session changes recorded since the last take.
    pub fn take_session_changes(&self) -> Vec<SessionSnapshot> {
        std::mem::take(&mut self.lock().sessions)
    }

    /// Take all telemetry recorded since the last take.
    pub fn take_telemetry(&self) -> Vec<TelemetryRecord> {
        std::mem::take(&mut self.lock().telemetry)
    }

    pub fn pending(&self) -> PendingCounts {
        let acc = self.lock();
        PendingCounts {
            sessions: acc.sessions.len(),
            telemetry: acc.telemetry.len(),
        }
    }

    /// Drop everything not yet taken.
    pub fn discard(&self) -> PendingCounts {
        let mut acc = self.lock();
        let dropped = PendingCounts {
            sessions: acc.sessions.len(),
            telemetry: acc.telemetry.len(),
        };
        acc.sessions.clear();
        acc.telemetry.clear();
        dropped
    }
}
