use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Every `TimeOfDay` is strictly below this.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Line item name carried by synthetic blocker orders.
pub const BLOCKER_ITEM: &str = "System Blocker";

/// Contact recorded on orders that have no real customer.
pub const SYSTEM_CONTACT: &str = "SYSTEM";

/// Minute of the day, the only slot time type. `"HH:MM"` on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes as u16))
    }

    pub fn hm(hour: u32, minute: u32) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minutes(hour * 60 + minute)
    }

    /// The minute containing `t` (seconds are dropped).
    pub fn of(t: NaiveDateTime) -> Self {
        Self((t.hour() * 60 + t.minute()) as u16)
    }

    pub fn minutes(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time of day {:?}, expected HH:MM", self.0)
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        let hour: u32 = h.trim().parse().map_err(|_| err())?;
        let minute: u32 = m.trim().parse().map_err(|_| err())?;
        Self::hm(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseTimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

/// Seconds elapsed since local midnight.
pub fn second_of_day(t: NaiveDateTime) -> u32 {
    t.num_seconds_from_midnight()
}

// ── Calendar ─────────────────────────────────────────────────────

/// Opening profile for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDay {
    pub weekday: Weekday,
    pub is_open: bool,
    pub open: TimeOfDay,
    pub close: TimeOfDay,
    pub rush_start: TimeOfDay,
    pub rush_end: TimeOfDay,
}

impl OpenDay {
    /// Rush hour is half-open: `[rush_start, rush_end)`.
    pub fn is_rush(&self, t: TimeOfDay) -> bool {
        self.rush_start <= t && t < self.rush_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Minimum lead time between "now" and the earliest bookable minute.
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: u32,
    /// Prep seconds per eligible unit outside rush hour.
    #[serde(default = "default_regular_prep_seconds")]
    pub regular_prep_seconds: u32,
    /// Prep seconds per eligible unit during rush hour.
    #[serde(default = "default_rush_prep_seconds")]
    pub rush_prep_seconds: u32,
    #[serde(default = "default_week")]
    pub open_days: Vec<OpenDay>,
}

fn default_active() -> bool {
    true
}

fn default_buffer_minutes() -> u32 {
    8
}

fn default_regular_prep_seconds() -> u32 {
    60
}

fn default_rush_prep_seconds() -> u32 {
    90
}

/// Mon-Fri 11:00-19:00, Sat 11:00-15:00, Sun closed; rush 12:00-13:00.
pub fn default_week() -> Vec<OpenDay> {
    let hm = |h, m| TimeOfDay::hm(h, m).unwrap_or_default();
    [
        (Weekday::Mon, true, 19),
        (Weekday::Tue, true, 19),
        (Weekday::Wed, true, 19),
        (Weekday::Thu, true, 19),
        (Weekday::Fri, true, 19),
        (Weekday::Sat, true, 15),
        (Weekday::Sun, false, 15),
    ]
    .into_iter()
    .map(|(weekday, is_open, close_hour)| OpenDay {
        weekday,
        is_open,
        open: hm(11, 0),
        close: hm(close_hour, 0),
        rush_start: hm(12, 0),
        rush_end: hm(13, 0),
    })
    .collect()
}

impl Location {
    /// A location with the default weekly profile and prep parameters.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            active: true,
            buffer_minutes: default_buffer_minutes(),
            regular_prep_seconds: default_regular_prep_seconds(),
            rush_prep_seconds: default_rush_prep_seconds(),
            open_days: default_week(),
        }
    }

    /// The configured profile for `date`, only if the location trades that day.
    pub fn open_day(&self, date: NaiveDate) -> Option<&OpenDay> {
        let weekday = date.weekday();
        self.open_days
            .iter()
            .find(|d| d.weekday == weekday && d.is_open)
    }

    pub fn prep_seconds_at(&self, day: &OpenDay, pickup: TimeOfDay) -> u32 {
        if day.is_rush(pickup) {
            self.rush_prep_seconds
        } else {
            self.regular_prep_seconds
        }
    }
}

// ── Orders ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Ready,
    Completed,
    Cancelled,
    /// Synthetic capacity withdrawal; only the escalator creates these.
    Blocked,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Ready => "READY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Blocked => "BLOCKED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    /// Items that need no kitchen time (drinks, sides) contribute nothing to prep cost.
    #[serde(default = "default_prep_eligible")]
    pub prep_eligible: bool,
}

fn default_prep_eligible() -> bool {
    true
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
            prep_eligible: true,
        }
    }

    pub fn without_prep(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
            prep_eligible: false,
        }
    }
}

/// `ceil(Σ(quantity × seconds_per_unit) / 60)` over prep-eligible items.
pub fn prep_cost_minutes(items: &[LineItem], seconds_per_unit: u32) -> u32 {
    let total: u64 = items
        .iter()
        .filter(|i| i.prep_eligible)
        .map(|i| i.quantity as u64 * seconds_per_unit as u64)
        .sum();
    total.div_ceil(60) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Ulid,
    pub location_id: String,
    pub contact: String,
    /// Local wall-clock creation instant; its date scopes the order to a trading day.
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub pickup_time: Option<TimeOfDay>,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_level: Option<u32>,
    pub items: Vec<LineItem>,
    /// Bumped by the store on every update.
    #[serde(default)]
    pub version: u64,
}

impl Order {
    pub fn pending(
        location_id: impl Into<String>,
        contact: impl Into<String>,
        created_at: NaiveDateTime,
        pickup_time: TimeOfDay,
        items: Vec<LineItem>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            location_id: location_id.into(),
            contact: contact.into(),
            created_at,
            pickup_time: Some(pickup_time),
            status: OrderStatus::Pending,
            blocking_level: None,
            items,
            version: 0,
        }
    }

    pub fn system_blocker(
        location_id: impl Into<String>,
        created_at: NaiveDateTime,
        pickup_time: TimeOfDay,
        level: u32,
    ) -> Self {
        Self {
            id: Ulid::new(),
            location_id: location_id.into(),
            contact: SYSTEM_CONTACT.to_string(),
            created_at,
            pickup_time: Some(pickup_time),
            status: OrderStatus::Blocked,
            blocking_level: Some(level),
            items: vec![LineItem::without_prep(BLOCKER_ITEM, 1)],
            version: 0,
        }
    }

    pub fn created_on(&self) -> NaiveDate {
        self.created_at.date()
    }

    pub fn is_active(&self) -> bool {
        self.status != OrderStatus::Cancelled
    }

    /// Whether this order holds its pickup minute on `date`. Orders hold the
    /// day they were placed on; PENDING orders from earlier days carry over
    /// until someone collects or cancels them.
    pub fn occupies(&self, date: NaiveDate) -> bool {
        if !self.is_active() || self.pickup_time.is_none() {
            return false;
        }
        match self.created_on().cmp(&date) {
            std::cmp::Ordering::Equal => true,
            std::cmp::Ordering::Less => self.status == OrderStatus::Pending,
            std::cmp::Ordering::Greater => false,
        }
    }

    /// Whether both orders claim the same pickup minute of the same location
    /// on some day.
    pub fn collides_with(&self, other: &Order) -> bool {
        if self.location_id != other.location_id || self.pickup_time != other.pickup_time {
            return false;
        }
        let day = self.created_on().max(other.created_on());
        self.occupies(day) && other.occupies(day)
    }

    pub fn is_system_blocker(&self) -> bool {
        self.status == OrderStatus::Blocked && self.items.iter().any(|i| i.name == BLOCKER_ITEM)
    }

    /// Prep minutes for this order at its current pickup time (0 if unscheduled).
    pub fn prep_cost(&self, location: &Location, day: &OpenDay) -> u32 {
        match self.pickup_time {
            Some(pickup) => prep_cost_minutes(&self.items, location.prep_seconds_at(day, pickup)),
            None => 0,
        }
    }
}

/// Partial update accepted by the order store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub pickup_time: Option<TimeOfDay>,
    /// Reject the update unless the stored version still matches.
    pub expected_version: Option<u64>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn pickup(pickup_time: TimeOfDay) -> Self {
        Self {
            pickup_time: Some(pickup_time),
            ..Self::default()
        }
    }

    pub fn if_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Store change notifications, fanned out per location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    OrderCreated { order: Order },
    OrderUpdated { order: Order },
    OrdersCleared,
}

// ── Query result types ───────────────────────────────────────────

/// Classification of one minute in the slot capacity model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Booked { contact: String },
    Blocked { contact: String, system_blocker: bool },
    Prep { for_contact: String },
    Past { contact: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub time: TimeOfDay,
    #[serde(flatten)]
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub free: usize,
    pub booked: usize,
    pub blocked: usize,
    pub prep: usize,
}

impl SlotStats {
    pub fn count(slots: &[SlotView]) -> Self {
        let mut stats = Self::default();
        for slot in slots {
            match slot.status {
                SlotStatus::Free => stats.free += 1,
                SlotStatus::Booked { .. } => stats.booked += 1,
                SlotStatus::Blocked { .. } => stats.blocked += 1,
                SlotStatus::Prep { .. } => stats.prep += 1,
                SlotStatus::Past { .. } => {}
            }
        }
        stats
    }
}

/// Answer of the availability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Slot(TimeOfDay),
    /// Scan reached closing time without an eligible minute.
    NoSlot,
    /// Location inactive, unknown for today, or not trading today.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Booked(Order),
    NoSlot,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedOrder {
    pub order: Order,
    pub delay_minutes: u32,
}
