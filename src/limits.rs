/// Delay assigned to a pending order created on an earlier day.
pub const FULLY_OVERDUE_MINUTES: u32 = 999;

/// Default pass cap for one rebooker run.
pub const DEFAULT_REBOOK_BUDGET: usize = 50;

/// Attempts at placing an order when the chosen minute is taken concurrently.
pub const MAX_PLACEMENT_ATTEMPTS: usize = 3;

pub const MAX_LINE_ITEMS: usize = 64;
pub const MAX_ITEM_QUANTITY: u32 = 100;
pub const MAX_CONTACT_LEN: usize = 256;

/// Fastest simulated clock: one day per 24 real seconds.
pub const MAX_CLOCK_SPEED: f64 = 3600.0;

/// Slot grid window around "now".
pub const GRID_MINUTES_BEFORE: u32 = 5;
pub const GRID_MINUTES_AFTER: u32 = 60;
