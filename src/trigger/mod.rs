// src/trigger/mod.rs

//! Clock-driven run creation.
//!
//! - [`schedule`]: cron parsing and no-catchup tick selection.
//! - [`queue`]: the queue-behind policy for ticks that fire mid-run.
//! - [`runner`]: the async loop tying both to an [`crate::engine::Engine`].

pub mod queue;
pub mod runner;
pub mod schedule;

pub use queue::{Offer, TickQueue};
pub use runner::Trigger;
pub use schedule::{CronSchedule, DueTick};
