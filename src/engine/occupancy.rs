use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

// ── Slot Capacity Model ───────────────────────────────────────────

#[derive(Debug, Clone)]
struct Occupant {
    id: Ulid,
    contact: String,
    blocked: bool,
    system_blocker: bool,
}

/// One minute of the day. Indices point into `SlotModel::occupants`.
#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    pickup: Option<usize>,
    /// Most recent order whose prep window covers this minute.
    prep: Option<usize>,
    prep_depth: u16,
}

/// Per-minute occupancy of one location's trading day.
///
/// A pickup claim is exclusive and always wins over prep markings when the
/// minute is classified; prep markings from different orders stack.
#[derive(Debug, Clone)]
pub struct SlotModel {
    date: NaiveDate,
    profile: OpenDay,
    buffer_minutes: u32,
    regular_prep_seconds: u32,
    rush_prep_seconds: u32,
    occupants: Vec<Occupant>,
    cells: Vec<Cell>,
}

impl SlotModel {
    pub fn empty(location: &Location, profile: &OpenDay, date: NaiveDate) -> Self {
        Self {
            date,
            profile: profile.clone(),
            buffer_minutes: location.buffer_minutes,
            regular_prep_seconds: location.regular_prep_seconds,
            rush_prep_seconds: location.rush_prep_seconds,
            occupants: Vec::new(),
            cells: vec![Cell::default(); MINUTES_PER_DAY as usize],
        }
    }

    /// Occupancy from a snapshot. Only active, scheduled orders of this
    /// location that hold a minute on `date` count; `exclude` drops the order
    /// being re-evaluated.
    pub fn build(
        location: &Location,
        profile: &OpenDay,
        date: NaiveDate,
        orders: &[Order],
        exclude: Option<Ulid>,
    ) -> Self {
        let mut model = Self::empty(location, profile, date);
        for order in orders {
            if order.location_id == location.id && Some(order.id) != exclude {
                model.insert(order);
            }
        }
        model
    }

    /// The model for `now`'s date, or `ConfigMissing` if the location does
    /// not trade today.
    pub fn today(
        location: &Location,
        now: NaiveDateTime,
        orders: &[Order],
        exclude: Option<Ulid>,
    ) -> Result<Self, EngineError> {
        let date = now.date();
        let profile = location
            .open_day(date)
            .filter(|_| location.active)
            .ok_or_else(|| EngineError::ConfigMissing(location.id.clone()))?;
        Ok(Self::build(location, profile, date, orders, exclude))
    }

    /// Add one order's footprint. Orders that hold no minute on this day
    /// (see `Order::occupies`) are ignored.
    pub fn insert(&mut self, order: &Order) {
        let Some(pickup) = order.pickup_time else {
            return;
        };
        if !order.occupies(self.date) {
            return;
        }

        let idx = self.occupants.len();
        self.occupants.push(Occupant {
            id: order.id,
            contact: order.contact.clone(),
            blocked: order.status == OrderStatus::Blocked,
            system_blocker: order.is_system_blocker(),
        });

        let p = pickup.minutes();
        self.cells[p as usize].pickup = Some(idx);

        let open = self.profile.open.minutes();
        let cost = self.prep_cost_at(&order.items, p);
        for i in 1..cost {
            let Some(m) = p.checked_sub(i) else { break };
            if m < open {
                break;
            }
            let cell = &mut self.cells[m as usize];
            cell.prep = Some(idx);
            cell.prep_depth += 1;
        }
    }

    /// Prep minutes for `items` picked up at minute `pickup`.
    pub fn prep_cost_at(&self, items: &[LineItem], pickup: u32) -> u32 {
        let rush = TimeOfDay::from_minutes(pickup).is_some_and(|t| self.profile.is_rush(t));
        let seconds = if rush {
            self.rush_prep_seconds
        } else {
            self.regular_prep_seconds
        };
        prep_cost_minutes(items, seconds)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn open(&self) -> TimeOfDay {
        self.profile.open
    }

    pub fn close(&self) -> TimeOfDay {
        self.profile.close
    }

    pub fn buffer_minutes(&self) -> u32 {
        self.buffer_minutes
    }

    /// Nothing claims or prepares at this minute.
    pub fn is_free(&self, minute: u32) -> bool {
        self.cells
            .get(minute as usize)
            .is_some_and(|c| c.pickup.is_none() && c.prep.is_none())
    }

    /// A booked or blocked pickup sits on this minute.
    pub fn is_claimed(&self, minute: u32) -> bool {
        self.cells
            .get(minute as usize)
            .is_some_and(|c| c.pickup.is_some())
    }

    pub fn pickup_owner(&self, minute: TimeOfDay) -> Option<Ulid> {
        self.cells[minute.minutes() as usize]
            .pickup
            .map(|idx| self.occupants[idx].id)
    }

    /// How many prep windows cover this minute.
    pub fn prep_depth(&self, minute: TimeOfDay) -> u16 {
        self.cells[minute.minutes() as usize].prep_depth
    }

    pub fn classify(&self, minute: TimeOfDay, now: NaiveDateTime) -> SlotStatus {
        let cell = &self.cells[minute.minutes() as usize];
        if (self.date, minute) < (now.date(), TimeOfDay::of(now)) {
            return SlotStatus::Past {
                contact: cell.pickup.map(|idx| self.occupants[idx].contact.clone()),
            };
        }
        if let Some(idx) = cell.pickup {
            let occupant = &self.occupants[idx];
            return if occupant.blocked {
                SlotStatus::Blocked {
                    contact: occupant.contact.clone(),
                    system_blocker: occupant.system_blocker,
                }
            } else {
                SlotStatus::Booked {
                    contact: occupant.contact.clone(),
                }
            };
        }
        if let Some(idx) = cell.prep {
            return SlotStatus::Prep {
                for_contact: self.occupants[idx].contact.clone(),
            };
        }
        SlotStatus::Free
    }

    /// Classified minutes from `now - before` up to `now + after` (exclusive),
    /// clipped to the day.
    pub fn grid(&self, now: NaiveDateTime, before: u32, after: u32) -> Vec<SlotView> {
        let center = TimeOfDay::of(now).minutes();
        let from = center.saturating_sub(before);
        let to = (center + after).min(MINUTES_PER_DAY);
        (from..to)
            .filter_map(TimeOfDay::from_minutes)
            .map(|time| SlotView {
                time,
                status: self.classify(time, now),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    // 2026-10-19 is a Monday.
    const DAY: &str = "2026-10-19";

    fn location() -> Location {
        let mut loc = Location::new("main");
        loc.buffer_minutes = 8;
        loc.regular_prep_seconds = 60;
        loc.rush_prep_seconds = 90;
        loc
    }

    fn order(contact: &str, pickup: &str, units: u32) -> Order {
        Order::pending(
            "main",
            contact,
            at(&format!("{DAY} 10:00:00")),
            t(pickup),
            vec![LineItem::new("KEBAP", units)],
        )
    }

    fn model(orders: &[Order]) -> SlotModel {
        SlotModel::today(&location(), at(&format!("{DAY} 10:30:00")), orders, None).unwrap()
    }

    #[test]
    fn prep_window_precedes_pickup() {
        let m = model(&[order("anna", "13:00", 5)]);
        let now = at(&format!("{DAY} 12:00:00"));
        assert_eq!(m.classify(t("12:55"), now), SlotStatus::Free);
        for minute in ["12:56", "12:57", "12:58", "12:59"] {
            assert_eq!(
                m.classify(t(minute), now),
                SlotStatus::Prep { for_contact: "anna".into() },
                "{minute}"
            );
        }
        assert_eq!(m.classify(t("13:00"), now), SlotStatus::Booked { contact: "anna".into() });
        assert_eq!(m.classify(t("13:01"), now), SlotStatus::Free);
    }

    #[test]
    fn rush_rate_lengthens_prep() {
        // 2 units at 90s = 180s = 3 minutes during rush.
        let m = model(&[order("anna", "12:30", 2)]);
        assert!(!m.is_free(t("12:28").minutes()));
        assert!(!m.is_free(t("12:29").minutes()));
        assert!(m.is_free(t("12:27").minutes()));
    }

    #[test]
    fn prep_never_overrides_a_pickup() {
        // bob's prep window (12:56-12:59) covers anna's pickup at 12:58.
        let m = model(&[order("anna", "12:58", 1), order("bob", "13:00", 5)]);
        let now = at(&format!("{DAY} 12:00:00"));
        assert_eq!(m.classify(t("12:58"), now), SlotStatus::Booked { contact: "anna".into() });
        assert_eq!(m.classify(t("12:59"), now), SlotStatus::Prep { for_contact: "bob".into() });
    }

    #[test]
    fn prep_windows_stack() {
        let m = model(&[order("anna", "13:00", 4), order("bob", "13:02", 4)]);
        // anna preps 12:57-12:59 and bob 12:59-13:01, so 12:59 carries both.
        assert_eq!(m.prep_depth(t("12:59")), 2);
        assert_eq!(m.prep_depth(t("12:58")), 1);
        let now = at(&format!("{DAY} 12:00:00"));
        assert_eq!(m.classify(t("12:59"), now), SlotStatus::Prep { for_contact: "bob".into() });
    }

    #[test]
    fn prep_clamped_at_open() {
        let m = model(&[order("anna", "11:02", 10)]);
        assert!(!m.is_free(t("11:00").minutes()));
        assert!(!m.is_free(t("11:01").minutes()));
        assert!(m.is_free(t("10:59").minutes()));
        assert_eq!(m.prep_depth(t("10:55")), 0);
    }

    #[test]
    fn ignores_cancelled_other_days_and_other_locations() {
        let mut cancelled = order("anna", "12:00", 1);
        cancelled.status = OrderStatus::Cancelled;
        let mut yesterday = order("bob", "12:10", 1);
        yesterday.created_at = at("2026-10-18 18:00:00");
        yesterday.status = OrderStatus::Completed;
        let mut elsewhere = order("cem", "12:20", 1);
        elsewhere.location_id = "north".into();
        let mut unscheduled = order("dan", "12:30", 1);
        unscheduled.pickup_time = None;

        let m = model(&[cancelled, yesterday, elsewhere, unscheduled]);
        for minute in ["12:00", "12:10", "12:20", "12:30"] {
            assert!(m.is_free(t(minute).minutes()), "{minute}");
        }
    }

    #[test]
    fn uncollected_order_from_an_earlier_day_still_holds_its_minute() {
        let mut leftover = order("bob", "12:10", 1);
        leftover.created_at = at("2026-10-16 18:00:00");
        let m = model(&[leftover.clone()]);
        assert!(m.is_claimed(t("12:10").minutes()));
        assert_eq!(m.pickup_owner(t("12:10")), Some(leftover.id));
    }

    #[test]
    fn exclude_drops_the_reevaluated_order() {
        let target = order("anna", "12:00", 3);
        let loc = location();
        let now = at(&format!("{DAY} 11:00:00"));
        let m = SlotModel::today(&loc, now, std::slice::from_ref(&target), Some(target.id)).unwrap();
        assert!(m.is_free(t("12:00").minutes()));
        assert!(m.is_free(t("11:59").minutes()));
    }

    #[test]
    fn blockers_classify_as_blocked_without_prep() {
        let blocker = Order::system_blocker("main", at(&format!("{DAY} 12:00:00")), t("12:20"), 1);
        let m = model(&[blocker.clone()]);
        let now = at(&format!("{DAY} 12:00:00"));
        assert_eq!(
            m.classify(t("12:20"), now),
            SlotStatus::Blocked { contact: SYSTEM_CONTACT.into(), system_blocker: true }
        );
        assert!(m.is_free(t("12:19").minutes()));
        assert_eq!(m.pickup_owner(t("12:20")), Some(blocker.id));
    }

    #[test]
    fn past_minutes_keep_their_owner() {
        let m = model(&[order("anna", "12:00", 1)]);
        let now = at(&format!("{DAY} 12:03:10"));
        assert_eq!(m.classify(t("12:00"), now), SlotStatus::Past { contact: Some("anna".into()) });
        assert_eq!(m.classify(t("12:02"), now), SlotStatus::Past { contact: None });
        assert_eq!(m.classify(t("12:03"), now), SlotStatus::Free);
    }

    #[test]
    fn grid_spans_five_back_sixty_ahead() {
        let m = model(&[order("anna", "12:30", 1)]);
        let grid = m.grid(at(&format!("{DAY} 12:00:00")), 5, 60);
        assert_eq!(grid.len(), 65);
        assert_eq!(grid[0].time, t("11:55"));
        assert_eq!(grid[64].time, t("12:59"));
        // 11:55-11:59 are past; anna's single rush unit preps at 12:29.
        let stats = SlotStats::count(&grid);
        assert_eq!(stats, SlotStats { free: 58, booked: 1, blocked: 0, prep: 1 });
    }

    #[test]
    fn grid_clipped_at_midnight() {
        let m = model(&[]);
        let grid = m.grid(at(&format!("{DAY} 23:30:00")), 5, 60);
        assert_eq!(grid.last().unwrap().time, t("23:59"));
        assert_eq!(grid.len(), 35);
    }

    #[test]
    fn closed_day_is_config_missing() {
        // 2026-10-18 is a Sunday.
        let result = SlotModel::today(&location(), at("2026-10-18 12:00:00"), &[], None);
        assert!(matches!(result, Err(EngineError::ConfigMissing(id)) if id == "main"));
    }

    #[test]
    fn inactive_location_is_config_missing() {
        let mut loc = location();
        loc.active = false;
        let result = SlotModel::today(&loc, at(&format!("{DAY} 12:00:00")), &[], None);
        assert!(matches!(result, Err(EngineError::ConfigMissing(_))));
    }

    #[test]
    fn no_prep_minute_before_pickup_is_free() {
        let orders: Vec<Order> = [("a", "11:30", 3), ("b", "12:15", 4), ("c", "12:45", 7), ("d", "14:00", 2)]
            .iter()
            .map(|(c, p, u)| order(c, p, *u))
            .collect();
        let loc = location();
        let day = loc.open_day(at(&format!("{DAY} 10:00:00")).date()).unwrap().clone();
        let m = model(&orders);
        for o in &orders {
            let k = o.prep_cost(&loc, &day);
            let p = o.pickup_time.unwrap().minutes();
            for i in 1..k {
                assert!(!m.is_free(p - i), "{} minus {i}", o.contact);
            }
        }
    }
}
