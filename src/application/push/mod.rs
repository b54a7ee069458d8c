//! Periodic pushing of gathered samples to a gateway.
//!
//! A [`PushJob`] owns one background loop that pushes on a fixed interval.
//! Timer ticks and manual triggers share a [`SingleFlightGuard`], so a push
//! that overruns its interval causes later attempts to be skipped rather than
//! queued.

pub mod scheduler;
pub mod single_flight;
pub mod stats;

pub use scheduler::{PushHandle, PushJob, PushOutcome, SchedulerState};
pub use single_flight::{FlightPermit, SingleFlightGuard};
pub use stats::{PushStats, PushStatsSnapshot};
