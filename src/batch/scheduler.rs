//! Adaptive drain-and-publish timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use super::EventBatcher;
use crate::error::HubError;
use crate::event::HubEvent;
use crate::Result;

/// Tick interval while no session changes are flowing.
pub const RESPONSIVE_INTERVAL: Duration = Duration::from_millis(500);

/// Tick interval after a tick that published session changes.
pub const LOAD_SHEDDING_INTERVAL: Duration = Duration::from_millis(2000);

/// The two intervals the scheduler switches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchIntervals {
    pub responsive: Duration,
    pub load_shedding: Duration,
}

impl Default for BatchIntervals {
    fn default() -> Self {
        Self {
            responsive: RESPONSIVE_INTERVAL,
            load_shedding: LOAD_SHEDDING_INTERVAL,
        }
    }
}

/// Periodically drains an [`EventBatcher`] into a consumer channel.
///
/// Only session churn moves the interval: a tick that published session
/// changes waits `load_shedding` before the next one, an idle tick waits
/// `responsive`. Publishing never waits on the consumer.
pub struct Scheduler {
    batcher: Arc<EventBatcher>,
    consumer: mpsc::UnboundedSender<HubEvent>,
    intervals: BatchIntervals,
    next: Duration,
}

impl Scheduler {
    pub fn new(batcher: Arc<EventBatcher>, consumer: mpsc::UnboundedSender<HubEvent>) -> Self {
        let intervals = BatchIntervals::default();
        Self {
            batcher,
            consumer,
            intervals,
            next: intervals.responsive,
        }
    }

    pub fn with_intervals(mut self, intervals: BatchIntervals) -> Self {
        self.intervals = intervals;
        self.next = intervals.responsive;
        self
    }

    /// Delay before the next tick.
    pub fn next_interval(&self) -> Duration {
        self.next
    }

    /// Drain both streams once, publish what is non-empty, and pick the next
    /// interval.
    ///
    /// Fails only when the consumer has gone away.
    pub fn tick(&mut self) -> Result<Duration> {
        let telemetry = self.batcher.take_telemetry();
        if !telemetry.is_empty() {
            trace!("Publishing {} telemetry records", telemetry.len());
            self.publish(HubEvent::Telemetry(telemetry))?;
        }

        let sessions = self.batcher.take_session_changes();
        self.next = if sessions.is_empty() {
            self.intervals.responsive
        } else {
            trace!("Publishing {} session changes", sessions.len());
            self.publish(HubEvent::SessionChanges(sessions))?;
            self.intervals.load_shedding
        };

        Ok(self.next)
    }

    fn publish(&self, event: HubEvent) -> Result<()> {
        self.consumer
            .send(event)
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Run until `shutdown` changes (or its sender is dropped), or until the
    /// consumer is closed. Anything recorded after the last tick is left in
    /// the batcher.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        debug!("Batch scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!("Batch scheduler cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.next) => {}
            }

            // Stop may land between the timer firing and the drain.
            if *shutdown.borrow() {
                debug!("Batch scheduler cancelled");
                break;
            }

            if let Err(e) = self.tick() {
                debug!("Batch scheduler stopping: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionHandle, Session, SessionSnapshot, TelemetryRecord};
    use serde_json::json;
    use tokio::time::Instant;

    fn snapshot() -> SessionSnapshot {
        let handle = ConnectionHandle::from_raw(1);
        Session::new(handle, handle.to_string(), "127.0.0.1:7000".parse().unwrap()).snapshot()
    }

    fn scheduler() -> (Scheduler, Arc<EventBatcher>, mpsc::UnboundedReceiver<HubEvent>) {
        let batcher = Arc::new(EventBatcher::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (Scheduler::new(Arc::clone(&batcher), tx), batcher, rx)
    }

    #[test]
    fn test_idle_tick_is_responsive() {
        let (mut scheduler, _batcher, mut rx) = scheduler();
        assert_eq!(scheduler.tick().unwrap(), RESPONSIVE_INTERVAL);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_session_changes_slow_down() {
        let (mut scheduler, batcher, mut rx) = scheduler();
        batcher.record_session_change(snapshot());

        assert_eq!(scheduler.tick().unwrap(), LOAD_SHEDDING_INTERVAL);
        assert!(matches!(rx.try_recv(), Ok(HubEvent::SessionChanges(b)) if b.len() == 1));

        // Next idle tick switches back.
        assert_eq!(scheduler.tick().unwrap(), RESPONSIVE_INTERVAL);
    }

    #[test]
    fn test_telemetry_does_not_drive_interval() {
        let (mut scheduler, batcher, mut rx) = scheduler();
        for i in 0..10 {
            batcher.record_telemetry(TelemetryRecord::new("agentA", "NetworkMetrics", json!(i)));
        }

        assert_eq!(scheduler.tick().unwrap(), RESPONSIVE_INTERVAL);
        match rx.try_recv() {
            Ok(HubEvent::Telemetry(batch)) => {
                let values: Vec<i64> = batch.iter().map(|r| r.payload.as_i64().unwrap()).collect();
                assert_eq!(values, (0..10).collect::<Vec<_>>());
            }
            other => panic!("expected telemetry batch, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_custom_intervals() {
        let batcher = Arc::new(EventBatcher::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let intervals = BatchIntervals {
            responsive: Duration::from_millis(50),
            load_shedding: Duration::from_millis(300),
        };
        let mut scheduler = Scheduler::new(Arc::clone(&batcher), tx).with_intervals(intervals);

        assert_eq!(scheduler.next_interval(), Duration::from_millis(50));
        batcher.record_session_change(snapshot());
        assert_eq!(scheduler.tick().unwrap(), Duration::from_millis(300));
    }

    #[test]
    fn test_closed_consumer() {
        let (mut scheduler, batcher, rx) = scheduler();
        drop(rx);
        batcher.record_session_change(snapshot());
        assert!(matches!(scheduler.tick(), Err(HubError::ChannelClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_adapts_interval() {
        let (scheduler, batcher, mut rx) = scheduler();
        let (stop_tx, stop_rx) = watch::channel(false);

        batcher.record_session_change(snapshot());
        let started = Instant::now();
        let task = tokio::spawn(scheduler.run(stop_rx));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, HubEvent::SessionChanges(_)));
        assert!(started.elapsed() >= RESPONSIVE_INTERVAL);

        let after_first = Instant::now();
        batcher.record_session_change(snapshot());
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, HubEvent::SessionChanges(_)));
        assert!(after_first.elapsed() >= LOAD_SHEDDING_INTERVAL);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_wins_over_due_tick() {
        for _ in 0..50 {
            let (scheduler, batcher, mut rx) = scheduler();
            let (stop_tx, stop_rx) = watch::channel(false);
            batcher.record_telemetry(TelemetryRecord::new("a", "Log", json!({})));

            let task = tokio::spawn(scheduler.run(stop_rx));
            // Let the task start its first sleep.
            tokio::task::yield_now().await;

            // Stop and the tick deadline are both ready on the next poll.
            stop_tx.send(true).unwrap();
            tokio::time::advance(RESPONSIVE_INTERVAL).await;
            task.await.unwrap();

            assert!(rx.try_recv().is_err(), "batch published after stop");
            assert_eq!(batcher.pending().telemetry, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_consumer_closes() {
        let (scheduler, batcher, rx) = scheduler();
        let (_stop_tx, stop_rx) = watch::channel(false);
        drop(rx);

        batcher.record_telemetry(TelemetryRecord::new("a", "Log", json!({})));
        let task = tokio::spawn(scheduler.run(stop_rx));
        task.await.unwrap();
    }
}
