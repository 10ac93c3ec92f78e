use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::engine::{Engine, RebookOutcome};
use crate::model::TimeOfDay;
use crate::observability;

/// Fires once per clock minute, whatever the clock speed.
#[derive(Debug, Default)]
pub struct MinuteWatch {
    last: Option<(NaiveDate, TimeOfDay)>,
}

impl MinuteWatch {
    /// True on the first call and whenever `now` has entered a new minute.
    pub fn changed(&mut self, now: NaiveDateTime) -> bool {
        let minute = (now.date(), TimeOfDay::of(now));
        if self.last == Some(minute) {
            return false;
        }
        self.last = Some(minute);
        true
    }
}

/// One escalator run. Failures are logged and left for the next minute.
/// Returns the number of blockers created.
pub async fn escalation_tick(engine: &Engine) -> usize {
    metrics::counter!(observability::ESCALATION_TICKS_TOTAL).increment(1);
    match engine.escalate().await {
        Ok(reports) => reports.iter().map(|r| r.created).sum(),
        Err(e) => {
            error!("escalation deferred: {e}");
            metrics::counter!(observability::STORE_ERRORS_TOTAL, "task" => "escalator").increment(1);
            0
        }
    }
}

/// One rebooker run. Returns the number of orders moved.
pub async fn rebook_tick(engine: &Engine) -> usize {
    match engine.rebook_overdue().await {
        Ok(report) => {
            if let RebookOutcome::BudgetExhausted { remaining } = report.outcome {
                debug!("rebook budget exhausted, {remaining} orders still overdue");
            }
            report.moved
        }
        Err(e) => {
            error!("rebook deferred: {e}");
            metrics::counter!(observability::STORE_ERRORS_TOTAL, "task" => "rebooker").increment(1);
            0
        }
    }
}

/// Background task that escalates on every minute transition of the engine clock.
pub async fn run_escalator(engine: Arc<Engine>, poll: Duration) {
    let mut interval = tokio::time::interval(poll);
    let mut watch = MinuteWatch::default();
    loop {
        interval.tick().await;
        if watch.changed(engine.now()) {
            escalation_tick(&engine).await;
        }
    }
}

/// Background task that rebooks overdue orders at a fixed interval.
pub async fn run_rebooker(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        rebook_tick(&engine).await;
    }
}

/// Start both loops. They run until their handles are aborted.
pub fn spawn(engine: Arc<Engine>, poll: Duration, every: Duration) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_escalator(engine.clone(), poll)),
        tokio::spawn(run_rebooker(engine, every)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::StaticCalendar;
    use crate::clock::SimClock;
    use crate::model::*;
    use crate::store::{LocalOrderStore, OrderStore, StoreError};

    use async_trait::async_trait;
    use tokio::sync::broadcast;
    use ulid::Ulid;

    fn at(time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2026-10-19 {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    struct DownStore;

    #[async_trait]
    impl OrderStore for DownStore {
        async fn list(&self) -> Result<Vec<Order>, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn create(&self, _order: Order) -> Result<Order, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn update(&self, _id: Ulid, _patch: OrderPatch) -> Result<Order, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn clear_all(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        fn subscribe(&self, _location_id: &str) -> broadcast::Receiver<StoreEvent> {
            broadcast::channel(1).1
        }
    }

    fn engine_with(store: Arc<dyn OrderStore>, now: NaiveDateTime) -> (Arc<Engine>, Arc<SimClock>) {
        let clock = Arc::new(SimClock::paused(now));
        let engine = Engine::new(store, Arc::new(StaticCalendar::default_location()), clock.clone());
        (Arc::new(engine), clock)
    }

    #[test]
    fn minute_watch_fires_once_per_minute() {
        let mut watch = MinuteWatch::default();
        assert!(watch.changed(at("12:00:05")));
        assert!(!watch.changed(at("12:00:40")));
        assert!(watch.changed(at("12:01:00")));
        assert!(!watch.changed(at("12:01:59")));
        // Same wall minute on another day is a new minute.
        assert!(watch.changed(at("12:01:59") + chrono::Duration::days(1)));
    }

    #[tokio::test]
    async fn store_failure_defers_instead_of_failing() {
        let (engine, _clock) = engine_with(Arc::new(DownStore), at("12:12:00"));
        assert_eq!(escalation_tick(&engine).await, 0);
        assert_eq!(rebook_tick(&engine).await, 0);
    }

    #[tokio::test]
    async fn ticks_report_their_work() {
        let store = Arc::new(LocalOrderStore::in_memory());
        let (engine, clock) = engine_with(store.clone(), at("12:03:00"));
        let late = Order::pending("main", "anna", at("11:00:00"), "12:00".parse().unwrap(), vec![LineItem::new("KEBAP", 1)]);
        store.create(late).await.unwrap();

        assert_eq!(escalation_tick(&engine).await, 3);
        assert_eq!(escalation_tick(&engine).await, 0);
        assert_eq!(rebook_tick(&engine).await, 1);
        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(rebook_tick(&engine).await, 0);
    }

    async fn wait_until<F: Fn(&[Order]) -> bool>(store: &LocalOrderStore, done: F) -> bool {
        for _ in 0..200 {
            if done(&store.list().await.unwrap()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn background_loops_escalate_then_rebook() {
        let store = Arc::new(LocalOrderStore::in_memory());
        let (engine, _clock) = engine_with(store.clone(), at("12:05:00"));
        let pickup: TimeOfDay = "12:00".parse().unwrap();
        let late = Order::pending("main", "anna", at("11:00:00"), pickup, vec![LineItem::new("KEBAP", 1)]);
        let late_id = late.id;
        store.create(late).await.unwrap();

        let escalator = tokio::spawn(run_escalator(engine.clone(), Duration::from_millis(10)));
        let escalated = wait_until(&store, |orders| {
            orders.iter().filter(|o| o.is_system_blocker()).count() == 5
        })
        .await;

        let rebooker = tokio::spawn(run_rebooker(engine, Duration::from_millis(10)));
        let rebooked = wait_until(&store, |orders| {
            orders
                .iter()
                .any(|o| o.id == late_id && o.pickup_time != Some(pickup))
        })
        .await;

        escalator.abort();
        rebooker.abort();
        assert!(escalated);
        assert!(rebooked);
        // Moved behind the five withdrawn minutes 12:13-12:17.
        assert_eq!(store.get(&late_id).unwrap().pickup_time, Some("12:19".parse().unwrap()));
    }
}
