use chrono::{NaiveDate, NaiveDateTime};

use crate::limits::FULLY_OVERDUE_MINUTES;
use crate::model::*;

/// Minutes a PENDING order is past its pickup, if any.
///
/// Orders from an earlier day count as fully overdue; orders dated after
/// `now` are never delayed.
pub fn delay_minutes(order: &Order, now: NaiveDateTime) -> Option<u32> {
    if order.status != OrderStatus::Pending {
        return None;
    }
    let pickup = order.pickup_time?;
    let today = now.date();
    let created = order.created_on();
    if created < today {
        return Some(FULLY_OVERDUE_MINUTES);
    }
    if created > today {
        return None;
    }
    let late = TimeOfDay::of(now).minutes().checked_sub(pickup.minutes())?;
    (late > 0).then_some(late)
}

pub fn is_overdue(order: &Order, now: NaiveDateTime) -> bool {
    delay_minutes(order, now).is_some()
}

/// Worst delay among one location's orders, 0 if nothing is late.
pub fn max_delay(orders: &[Order], location_id: &str, now: NaiveDateTime) -> u32 {
    orders
        .iter()
        .filter(|o| o.location_id == location_id)
        .filter_map(|o| delay_minutes(o, now))
        .max()
        .unwrap_or(0)
}

/// Highest blocker level reached at a location on `day`, 0 if none.
pub fn current_blocking_level(orders: &[Order], location_id: &str, day: NaiveDate) -> u32 {
    orders
        .iter()
        .filter(|o| {
            o.status == OrderStatus::Blocked
                && o.location_id == location_id
                && o.created_on() == day
        })
        .filter_map(|o| o.blocking_level)
        .max()
        .unwrap_or(0)
}
