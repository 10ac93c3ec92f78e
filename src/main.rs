use std::sync::Arc;

use chrono::Local;
use tracing::info;

use kitchen_slots::calendar::{LocationCalendar, StaticCalendar};
use kitchen_slots::clock::{Clock, SimClock, SystemClock};
use kitchen_slots::config::Config;
use kitchen_slots::engine::Engine;
use kitchen_slots::model::{Availability, LineItem};
use kitchen_slots::reconciler;
use kitchen_slots::store::LocalOrderStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    kitchen_slots::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let calendar = match &config.locations_file {
        Some(path) => StaticCalendar::from_file(path)?,
        None => StaticCalendar::default_location(),
    };
    let store = LocalOrderStore::open(&config.orders_path())?;

    let clock: Arc<dyn Clock> = if config.simulated() {
        let start = config
            .clock_start
            .unwrap_or_else(|| Local::now().naive_local());
        Arc::new(SimClock::running(start, config.clock_speed))
    } else {
        Arc::new(SystemClock)
    };

    let engine = Arc::new(
        Engine::new(Arc::new(store), Arc::new(calendar), clock)
            .with_rebook_budget(config.rebook_budget),
    );

    info!("kitchen-slots started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  clock: {} (speed {})", engine.now(), config.clock_speed);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let sample = [LineItem::new("sample", 1)];
    for location in engine.calendar.list().await? {
        match engine.next_available(&location.id, &sample).await? {
            Availability::Slot(t) => info!("  {}: next pickup {t}", location.id),
            Availability::NoSlot => info!("  {}: fully booked today", location.id),
            Availability::Closed => tracing::warn!("  {}: closed today", location.id),
        }
    }

    let handles = reconciler::spawn(engine, config.escalator_poll, config.rebook_interval);

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received, stopping reconcilers");
    for handle in handles {
        handle.abort();
    }
    info!("kitchen-slots stopped");
    Ok(())
}
