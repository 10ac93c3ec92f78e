use std::time::Instant;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{Footprint, next_available};
use super::delay::delay_minutes;
use super::occupancy::SlotModel;
use super::{Engine, EngineError};

impl Engine {
    pub async fn location(&self, location_id: &str) -> Result<Location, EngineError> {
        self.calendar
            .list()
            .await?
            .into_iter()
            .find(|l| l.id == location_id)
            .ok_or_else(|| EngineError::UnknownLocation(location_id.to_string()))
    }

    /// Today's occupancy at a location.
    pub async fn slot_model(&self, location_id: &str) -> Result<SlotModel, EngineError> {
        let location = self.location(location_id).await?;
        let orders = self.store.list().await?;
        SlotModel::today(&location, self.now(), &orders, None)
    }

    /// Earliest pickup minute for an order of `items` placed now.
    pub async fn next_available(
        &self,
        location_id: &str,
        items: &[LineItem],
    ) -> Result<Availability, EngineError> {
        let model = match self.slot_model(location_id).await {
            Ok(model) => model,
            Err(EngineError::UnknownLocation(_) | EngineError::ConfigMissing(_)) => {
                return Ok(Availability::Closed);
            }
            Err(e) => return Err(e),
        };

        let start = Instant::now();
        let slot = next_available(&model, self.now(), Footprint::Items(items));
        metrics::histogram!(observability::SLOT_SEARCH_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());

        Ok(match slot {
            Some(slot) => Availability::Slot(slot),
            None => {
                metrics::counter!(observability::NO_SLOT_TOTAL, "location" => location_id.to_string())
                    .increment(1);
                Availability::NoSlot
            }
        })
    }

    /// Classified minutes around now, for the live slot view.
    pub async fn slot_grid(&self, location_id: &str) -> Result<Vec<SlotView>, EngineError> {
        let model = self.slot_model(location_id).await?;
        Ok(model.grid(self.now(), GRID_MINUTES_BEFORE, GRID_MINUTES_AFTER))
    }

    /// Overdue PENDING orders with their delay, most overdue first.
    pub async fn delayed_orders(&self, location_id: &str) -> Result<Vec<DelayedOrder>, EngineError> {
        let now = self.now();
        let mut delayed: Vec<DelayedOrder> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|o| o.location_id == location_id)
            .filter_map(|order| {
                delay_minutes(&order, now).map(|delay_minutes| DelayedOrder {
                    order,
                    delay_minutes,
                })
            })
            .collect();
        delayed.sort_by(|a, b| b.delay_minutes.cmp(&a.delay_minutes));
        Ok(delayed)
    }

    /// PENDING orders of a location by pickup time, unscheduled last.
    pub async fn pending_queue(
        &self,
        location_id: &str,
        limit: usize,
    ) -> Result<Vec<Order>, EngineError> {
        let mut pending: Vec<Order> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|o| o.location_id == location_id && o.status == OrderStatus::Pending)
            .collect();
        pending.sort_by(|a, b| {
            let key = |o: &Order| (o.created_on(), o.pickup_time.is_none(), o.pickup_time);
            key(a).cmp(&key(b)).then(a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }
}
