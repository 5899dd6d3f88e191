// src/trigger/queue.rs

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// What happened to a tick offered to the [`TickQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Nothing in flight; start this tick now.
    Start(DateTime<Utc>),
    /// A run is in flight; the tick waits behind it. `replaced` is the older
    /// pending tick it displaced, if any.
    Queued { replaced: Option<DateTime<Utc>> },
    /// The tick is already in flight or pending.
    Duplicate,
}

/// Queue-behind policy for ticks that fire while a run is still active.
///
/// At most one run is in flight and at most one tick waits behind it. A
/// newer tick replaces an older pending one, so the backlog never grows past
/// one run.
#[derive(Debug, Default)]
pub struct TickQueue {
    in_flight: Option<DateTime<Utc>>,
    pending: Option<DateTime<Utc>>,
}

impl TickQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> Option<DateTime<Utc>> {
        self.in_flight
    }

    pub fn pending(&self) -> Option<DateTime<Utc>> {
        self.pending
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn offer(&mut self, tick: DateTime<Utc>) -> Offer {
        if self.in_flight == Some(tick) || self.pending == Some(tick) {
            return Offer::Duplicate;
        }

        if self.in_flight.is_none() {
            self.in_flight = Some(tick);
            return Offer::Start(tick);
        }

        let replaced = self.pending.replace(tick);
        match replaced {
            Some(old) => warn!(
                %tick,
                dropped = %old,
                "run still in flight; newer tick replaces the pending one"
            ),
            None => debug!(%tick, "run still in flight; tick queued behind it"),
        }
        Offer::Queued { replaced }
    }

    /// The in-flight run finished. Returns the pending tick, which becomes
    /// the new in-flight run.
    pub fn finish(&mut self) -> Option<DateTime<Utc>> {
        self.in_flight = self.pending.take();
        self.in_flight
    }

    /// Forget the pending tick (used on shutdown).
    pub fn drop_pending(&mut self) -> Option<DateTime<Utc>> {
        self.pending.take()
    }
}
