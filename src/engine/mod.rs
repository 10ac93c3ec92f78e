mod availability;
mod delay;
mod error;
mod escalator;
mod mutations;
mod occupancy;
mod queries;
mod rebooker;

pub use availability::{Footprint, eligible_slots, next_available};
pub use delay::{current_blocking_level, delay_minutes, is_overdue, max_delay};
pub use error::EngineError;
pub use escalator::{EscalationPlan, EscalationReport, plan_escalation};
pub use occupancy::SlotModel;
pub use rebooker::{RebookOutcome, RebookReport, next_slot_for, overdue_orders};

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::calendar::LocationCalendar;
use crate::clock::Clock;
use crate::limits::DEFAULT_REBOOK_BUDGET;
use crate::store::OrderStore;

/// Shared handle over the order store, the location calendar and the clock.
///
/// Holds no scheduling state of its own: every operation reads a fresh
/// snapshot from the store, decides against `clock.now()`, and writes back
/// one order at a time.
pub struct Engine {
    pub store: Arc<dyn OrderStore>,
    pub calendar: Arc<dyn LocationCalendar>,
    pub clock: Arc<dyn Clock>,
    rebook_budget: usize,
}

impl Engine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        calendar: Arc<dyn LocationCalendar>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            calendar,
            clock,
            rebook_budget: DEFAULT_REBOOK_BUDGET,
        }
    }

    /// Cap on rebooker passes per run. At least one pass always runs.
    pub fn with_rebook_budget(mut self, budget: usize) -> Self {
        self.rebook_budget = budget.max(1);
        self
    }

    pub fn rebook_budget(&self) -> usize {
        self.rebook_budget
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }
}
