use chrono::NaiveDateTime;

use crate::model::*;

use super::occupancy::SlotModel;

// ── Availability Algorithm ────────────────────────────────────────

/// What an order occupies around its pickup minute.
#[derive(Debug, Clone, Copy)]
pub enum Footprint<'a> {
    /// Fixed span in minutes, pickup minute included. System blockers use 1.
    Minutes(u32),
    /// Prep cost of these items, evaluated at each candidate minute.
    Items(&'a [LineItem]),
}

impl Footprint<'static> {
    pub const BLOCKER: Self = Footprint::Minutes(1);
}

impl Footprint<'_> {
    fn cost_at(&self, model: &SlotModel, minute: u32) -> u32 {
        match self {
            Footprint::Minutes(m) => *m,
            Footprint::Items(items) => model.prep_cost_at(items, minute),
        }
    }
}

/// Candidate C fits if C itself is untouched and every earlier minute of its
/// prep window lies inside opening hours without landing on another pickup.
/// Prep windows may overlap each other.
fn fits(model: &SlotModel, candidate: u32, cost: u32) -> bool {
    if !model.is_free(candidate) {
        return false;
    }
    let open = model.open().minutes();
    (1..cost).all(|i| {
        candidate
            .checked_sub(i)
            .is_some_and(|m| m >= open && !model.is_claimed(m))
    })
}

/// Every eligible pickup minute for today, ascending.
///
/// Scans from `max(now's minute, open)` through `close` inclusive, skipping
/// anything earlier than `now + buffer` at second precision. Yields nothing
/// when `model` describes another day.
pub fn eligible_slots<'a>(
    model: &'a SlotModel,
    now: NaiveDateTime,
    footprint: Footprint<'a>,
) -> impl Iterator<Item = TimeOfDay> + 'a {
    let today = now.date() == model.date();
    let earliest_second = second_of_day(now) + model.buffer_minutes() * 60;
    let start = TimeOfDay::of(now).minutes().max(model.open().minutes());
    let end = if today { model.close().minutes() + 1 } else { start };

    (start..end)
        .filter(move |c| c * 60 >= earliest_second)
        .filter(move |&c| fits(model, c, footprint.cost_at(model, c)))
        .filter_map(TimeOfDay::from_minutes)
}

/// The earliest eligible pickup minute, or `None` if capacity is exhausted
/// up to closing time.
pub fn next_available(
    model: &SlotModel,
    now: NaiveDateTime,
    footprint: Footprint<'_>,
) -> Option<TimeOfDay> {
    eligible_slots(model, now, footprint).next()
}
