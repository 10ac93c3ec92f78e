use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::availability::{Footprint, next_available};
use super::occupancy::SlotModel;
use super::{Engine, EngineError};

fn validate_order(contact: &str, items: &[LineItem]) -> Result<(), EngineError> {
    if contact.trim().is_empty() {
        return Err(EngineError::InvalidOrder("contact is empty"));
    }
    if contact.len() > MAX_CONTACT_LEN {
        return Err(EngineError::LimitExceeded("contact too long"));
    }
    if items.is_empty() {
        return Err(EngineError::InvalidOrder("order has no items"));
    }
    if items.len() > MAX_LINE_ITEMS {
        return Err(EngineError::LimitExceeded("too many line items"));
    }
    for item in items {
        if item.quantity == 0 {
            return Err(EngineError::InvalidOrder("item quantity is zero"));
        }
        if item.quantity > MAX_ITEM_QUANTITY {
            return Err(EngineError::LimitExceeded("item quantity too large"));
        }
    }
    Ok(())
}

impl Engine {
    /// Book `items` for `contact` at the earliest eligible minute.
    ///
    /// The store rejects a pickup minute taken in the meantime; the search is
    /// then repeated against a fresh snapshot.
    pub async fn place_order(
        &self,
        location_id: &str,
        contact: &str,
        items: Vec<LineItem>,
    ) -> Result<Placement, EngineError> {
        validate_order(contact, &items)?;
        let location = match self.location(location_id).await {
            Ok(location) => location,
            Err(EngineError::UnknownLocation(_)) => return Ok(Placement::Closed),
            Err(e) => return Err(e),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.now();
            let orders = self.store.list().await?;
            let model = match SlotModel::today(&location, now, &orders, None) {
                Ok(model) => model,
                Err(EngineError::ConfigMissing(_)) => return Ok(Placement::Closed),
                Err(e) => return Err(e),
            };
            let Some(pickup) = next_available(&model, now, Footprint::Items(&items)) else {
                metrics::counter!(observability::NO_SLOT_TOTAL, "location" => location.id.clone())
                    .increment(1);
                return Ok(Placement::NoSlot);
            };

            let order = Order::pending(location.id.clone(), contact, now, pickup, items.clone());
            match self.store.create(order).await {
                Ok(order) => {
                    metrics::counter!(observability::ORDERS_PLACED_TOTAL, "location" => location.id.clone())
                        .increment(1);
                    info!("{}: order {} for {contact} at {pickup}", location.id, order.id);
                    return Ok(Placement::Booked(order));
                }
                Err(e @ StoreError::SlotTaken { .. }) if attempt < MAX_PLACEMENT_ATTEMPTS => {
                    debug!("{}: placement attempt {attempt} lost the race: {e}", location.id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Staff status change. BLOCKED is reserved for system blockers.
    pub async fn set_status(&self, id: Ulid, status: OrderStatus) -> Result<Order, EngineError> {
        if status == OrderStatus::Blocked {
            let current = self
                .store
                .list()
                .await?
                .into_iter()
                .find(|o| o.id == id)
                .ok_or(StoreError::NotFound(id))?;
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to: status,
            });
        }
        let order = self.store.update(id, OrderPatch::status(status)).await?;
        info!("order {id} is now {status}");
        Ok(order)
    }

    pub async fn cancel_order(&self, id: Ulid) -> Result<Order, EngineError> {
        self.set_status(id, OrderStatus::Cancelled).await
    }

    /// Drop every order, blockers included.
    pub async fn clear_all(&self) -> Result<(), EngineError> {
        self.store.clear_all().await?;
        info!("all orders cleared");
        Ok(())
    }
}
