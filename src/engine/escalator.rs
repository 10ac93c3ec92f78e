use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::availability::{Footprint, next_available};
use super::delay::{current_blocking_level, max_delay};
use super::occupancy::SlotModel;
use super::{Engine, EngineError};

/// Blockers one location needs right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPlan {
    pub location_id: String,
    /// Worst current delay in minutes.
    pub required_level: u32,
    /// Highest level already blocked today.
    pub current_level: u32,
    /// One blocker per missing level, ascending, each on its own minute.
    pub blockers: Vec<Order>,
    /// The scan ran out of minutes before `required_level` was covered.
    pub capacity_exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationReport {
    pub location_id: String,
    pub required_level: u32,
    pub reached_level: u32,
    pub created: usize,
}

/// Withdraw one minute of capacity per minute of delay.
///
/// Levels never go down: if the worst delay shrinks, existing blockers stay
/// and nothing is planned.
pub fn plan_escalation(
    location: &Location,
    orders: &[Order],
    now: NaiveDateTime,
) -> Result<EscalationPlan, EngineError> {
    let required_level = max_delay(orders, &location.id, now);
    let current_level = current_blocking_level(orders, &location.id, now.date());
    let mut plan = EscalationPlan {
        location_id: location.id.clone(),
        required_level,
        current_level,
        blockers: Vec::new(),
        capacity_exhausted: false,
    };
    if required_level <= current_level {
        return Ok(plan);
    }

    let mut model = SlotModel::today(location, now, orders, None)?;
    for level in current_level + 1..=required_level {
        let Some(pickup) = next_available(&model, now, Footprint::BLOCKER) else {
            plan.capacity_exhausted = true;
            break;
        };
        let blocker = Order::system_blocker(location.id.clone(), now, pickup, level);
        model.insert(&blocker);
        plan.blockers.push(blocker);
    }
    Ok(plan)
}

impl Engine {
    /// One escalator run over every location.
    pub async fn escalate(&self) -> Result<Vec<EscalationReport>, EngineError> {
        let now = self.now();
        let locations = self.calendar.list().await?;
        let orders = self.store.list().await?;

        let mut reports = Vec::with_capacity(locations.len());
        for location in &locations {
            let plan = match plan_escalation(location, &orders, now) {
                Ok(plan) => plan,
                Err(EngineError::ConfigMissing(id)) => {
                    debug!("escalation skipped for {id}: no open hours today");
                    continue;
                }
                Err(e) => return Err(e),
            };
            reports.push(self.apply_escalation(plan).await?);
        }
        Ok(reports)
    }

    async fn apply_escalation(&self, plan: EscalationPlan) -> Result<EscalationReport, EngineError> {
        let location_id = plan.location_id;
        let mut reached_level = plan.current_level;
        let mut created = 0;

        for blocker in plan.blockers {
            let level = blocker.blocking_level.unwrap_or_default();
            match self.store.create(blocker).await {
                Ok(blocker) => {
                    reached_level = level;
                    created += 1;
                    metrics::counter!(observability::BLOCKERS_CREATED_TOTAL, "location" => location_id.clone())
                        .increment(1);
                    if let Some(pickup) = blocker.pickup_time {
                        info!("{location_id}: blocker level {level} at {pickup}");
                    }
                }
                Err(e @ (StoreError::LevelTaken { .. } | StoreError::SlotTaken { .. })) => {
                    debug!("{location_id}: escalation stopped at level {level}: {e}");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        metrics::gauge!(observability::BLOCKING_LEVEL, "location" => location_id.clone())
            .set(reached_level as f64);
        if plan.capacity_exhausted {
            warn!(
                "{location_id}: no free minute left today, blocking level {reached_level} of {}",
                plan.required_level
            );
        }

        Ok(EscalationReport {
            location_id,
            required_level: plan.required_level,
            reached_level,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    // 2026-10-19 is a Monday.
    fn at(time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2026-10-19 {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn late_order(pickup: &str) -> Order {
        Order::pending("main", "anna", at("11:00:00"), t(pickup), vec![LineItem::new("KEBAP", 1)])
    }

    #[test]
    fn twelve_minutes_late_plans_twelve_levels() {
        let loc = Location::new("main");
        let now = at("12:12:00");
        let plan = plan_escalation(&loc, &[late_order("12:00")], now).unwrap();
        assert_eq!(plan.required_level, 12);
        assert_eq!(plan.current_level, 0);
        assert!(!plan.capacity_exhausted);

        let levels: Vec<u32> = plan.blockers.iter().filter_map(|b| b.blocking_level).collect();
        assert_eq!(levels, (1..=12).collect::<Vec<_>>());

        let pickups: Vec<TimeOfDay> = plan.blockers.iter().filter_map(|b| b.pickup_time).collect();
        // Buffer of 8 minutes, then one minute per level.
        assert_eq!(pickups.first(), Some(&t("12:20")));
        assert_eq!(pickups.last(), Some(&t("12:31")));
        for pair in pickups.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(plan.blockers.iter().all(|b| b.is_system_blocker() && b.created_at == now));
    }

    #[test]
    fn existing_levels_are_not_replanned() {
        let loc = Location::new("main");
        let now = at("12:12:00");
        let mut orders = vec![late_order("12:00")];
        for level in 1..=10 {
            orders.push(Order::system_blocker("main", at("12:05:00"), t(&format!("13:{level:02}")), level));
        }
        let plan = plan_escalation(&loc, &orders, now).unwrap();
        assert_eq!(plan.current_level, 10);
        let levels: Vec<u32> = plan.blockers.iter().filter_map(|b| b.blocking_level).collect();
        assert_eq!(levels, vec![11, 12]);
    }

    #[test]
    fn shrinking_delay_plans_nothing() {
        let loc = Location::new("main");
        let now = at("12:12:00");
        let orders = vec![
            late_order("12:10"),
            Order::system_blocker("main", at("12:05:00"), t("13:01"), 5),
        ];
        let plan = plan_escalation(&loc, &orders, now).unwrap();
        assert_eq!(plan.required_level, 2);
        assert!(plan.blockers.is_empty());
    }

    #[test]
    fn no_delay_needs_no_open_day() {
        let loc = Location::new("main");
        // Sunday: no profile, but nothing is late either.
        let now = NaiveDateTime::parse_from_str("2026-10-18 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let plan = plan_escalation(&loc, &[], now).unwrap();
        assert_eq!(plan.required_level, 0);
    }

    #[test]
    fn stops_when_the_day_is_full() {
        let loc = Location::new("main");
        let now = at("18:40:00");
        // 18:48 through 19:00 leaves 13 minutes for 30 levels.
        let plan = plan_escalation(&loc, &[late_order("18:10")], now).unwrap();
        assert_eq!(plan.required_level, 30);
        assert_eq!(plan.blockers.len(), 13);
        assert!(plan.capacity_exhausted);
    }

    #[test]
    fn blockers_avoid_prep_windows() {
        let loc = Location::new("main");
        let now = at("14:00:00");
        let orders = vec![
            late_order("13:58"),
            // Preps 14:07-14:09, picks up at 14:10.
            Order::pending("main", "bob", at("13:00:00"), t("14:10"), vec![LineItem::new("KEBAP", 4)]),
        ];
        let plan = plan_escalation(&loc, &orders, now).unwrap();
        let pickups: Vec<TimeOfDay> = plan.blockers.iter().filter_map(|b| b.pickup_time).collect();
        assert_eq!(pickups, vec![t("14:11"), t("14:12")]);
    }
}
