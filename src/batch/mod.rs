//! Batched delivery of registry changes.
//!
//! The registry records into an [`EventBatcher`] at network speed; a
//! [`Scheduler`] drains it on a slower, load-dependent cadence and publishes
//! each non-empty batch as a [`HubEvent`](crate::event::HubEvent).

mod batcher;
mod scheduler;

pub use batcher::{EventBatcher, PendingCounts};
pub use scheduler::{BatchIntervals, Scheduler, LOAD_SHEDDING_INTERVAL, RESPONSIVE_INTERVAL};
