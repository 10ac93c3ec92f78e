use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::availability::{Footprint, next_available};
use super::delay::is_overdue;
use super::occupancy::SlotModel;
use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebookOutcome {
    /// No overdue order left.
    Settled,
    /// A whole pass moved nothing; these orders stay overdue for now.
    FixedPoint { remaining: usize },
    /// Pass cap reached while orders were still moving.
    BudgetExhausted { remaining: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebookReport {
    pub outcome: RebookOutcome,
    pub passes: usize,
    pub moved: usize,
}

/// PENDING orders past their pickup, earliest pickup first.
pub fn overdue_orders(orders: &[Order], now: NaiveDateTime) -> Vec<&Order> {
    let mut overdue: Vec<&Order> = orders.iter().filter(|o| is_overdue(o, now)).collect();
    overdue.sort_by(|a, b| {
        a.pickup_time
            .cmp(&b.pickup_time)
            .then(a.created_at.cmp(&b.created_at))
    });
    overdue
}

/// Where `order` could be picked up now, judged as if it were not booked.
/// `None` if no minute is left or the earliest one is where it already is.
pub fn next_slot_for(
    location: &Location,
    orders: &[Order],
    order: &Order,
    now: NaiveDateTime,
) -> Result<Option<TimeOfDay>, EngineError> {
    let model = SlotModel::today(location, now, orders, Some(order.id))?;
    let slot = next_available(&model, now, Footprint::Items(&order.items));
    Ok(slot.filter(|s| Some(*s) != order.pickup_time))
}

impl Engine {
    /// Move overdue orders to the next free minute, repeating until nothing
    /// is overdue, a pass changes nothing, or the pass budget runs out.
    pub async fn rebook_overdue(&self) -> Result<RebookReport, EngineError> {
        let locations = self.calendar.list().await?;
        let mut moved = 0;
        let mut remaining = 0;

        for pass in 1..=self.rebook_budget {
            let now = self.now();
            let mut orders = self.store.list().await?;
            let overdue: Vec<Order> = overdue_orders(&orders, now).into_iter().cloned().collect();
            if overdue.is_empty() {
                return Ok(self.finish(RebookOutcome::Settled, pass, moved));
            }

            let mut changed = 0;
            for order in &overdue {
                let Some(location) = locations.iter().find(|l| l.id == order.location_id) else {
                    debug!("rebook skipped {}: unknown location {}", order.id, order.location_id);
                    continue;
                };
                let slot = match next_slot_for(location, &orders, order, now) {
                    Ok(Some(slot)) => slot,
                    Ok(None) | Err(EngineError::ConfigMissing(_)) => continue,
                    Err(e) => return Err(e),
                };

                let patch = OrderPatch::pickup(slot).if_version(order.version);
                match self.store.update(order.id, patch).await {
                    Ok(updated) => {
                        if let Some(entry) = orders.iter_mut().find(|o| o.id == updated.id) {
                            *entry = updated;
                        }
                        changed += 1;
                        metrics::counter!(observability::ORDERS_REBOOKED_TOTAL).increment(1);
                        info!("rebooked overdue order {} for {} to {slot}", order.id, order.contact);
                    }
                    Err(
                        e @ (StoreError::VersionMismatch { .. }
                        | StoreError::SlotTaken { .. }
                        | StoreError::NotFound(_)
                        | StoreError::Immutable(_)),
                    ) => {
                        debug!("rebook skipped {}: {e}", order.id);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            moved += changed;
            remaining = overdue_orders(&orders, now).len();
            if changed == 0 {
                return Ok(self.finish(RebookOutcome::FixedPoint { remaining }, pass, moved));
            }
        }

        if remaining == 0 {
            return Ok(self.finish(RebookOutcome::Settled, self.rebook_budget, moved));
        }
        debug!(
            "rebooker stopped after {} passes with {remaining} orders still overdue",
            self.rebook_budget
        );
        Ok(self.finish(
            RebookOutcome::BudgetExhausted { remaining },
            self.rebook_budget,
            moved,
        ))
    }

    fn finish(&self, outcome: RebookOutcome, passes: usize, moved: usize) -> RebookReport {
        metrics::histogram!(observability::REBOOK_PASSES).record(passes as f64);
        RebookReport {
            outcome,
            passes,
            moved,
        }
    }
}
