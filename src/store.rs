use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Another active order of the same location and day holds this pickup minute.
    SlotTaken {
        pickup: TimeOfDay,
        holder: Ulid,
    },
    /// A blocker for this (location, day, level) already exists.
    LevelTaken {
        location_id: String,
        level: u32,
    },
    /// Blocker orders are never mutated after creation.
    Immutable(Ulid),
    VersionMismatch {
        id: Ulid,
        expected: u64,
        actual: u64,
    },
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "order not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "order already exists: {id}"),
            StoreError::SlotTaken { pickup, holder } => {
                write!(f, "pickup slot {pickup} already held by order {holder}")
            }
            StoreError::LevelTaken { location_id, level } => {
                write!(f, "blocking level {level} already reached at {location_id}")
            }
            StoreError::Immutable(id) => write!(f, "order {id} is a blocker and cannot change"),
            StoreError::VersionMismatch {
                id,
                expected,
                actual,
            } => write!(
                f,
                "order {id} changed concurrently: expected version {expected}, found {actual}"
            ),
            StoreError::Unavailable(e) => write!(f, "order store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The shared order collection every task reads and writes. Each call is
/// atomic on its own; nothing spans calls.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Order>, StoreError>;
    async fn create(&self, order: Order) -> Result<Order, StoreError>;
    async fn update(&self, id: Ulid, patch: OrderPatch) -> Result<Order, StoreError>;
    async fn clear_all(&self) -> Result<(), StoreError>;
    /// Change feed for one location.
    fn subscribe(&self, location_id: &str) -> broadcast::Receiver<StoreEvent>;
}

/// In-process order store, optionally mirrored to a JSON snapshot file.
///
/// Reads go straight to the map; writers are serialised so the uniqueness
/// checks and the snapshot file always agree with the map.
pub struct LocalOrderStore {
    orders: DashMap<Ulid, Order>,
    write_lock: Mutex<()>,
    path: Option<PathBuf>,
    notify: NotifyHub,
}

impl Default for LocalOrderStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalOrderStore {
    pub fn in_memory() -> Self {
        Self {
            orders: DashMap::new(),
            write_lock: Mutex::new(()),
            path: None,
            notify: NotifyHub::new(),
        }
    }

    /// Open (or create) a store persisted at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> io::Result<Self> {
        let orders = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<Vec<Order>>(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        let store = Self {
            path: Some(path.to_path_buf()),
            ..Self::in_memory()
        };
        for order in orders {
            store.orders.insert(order.id, order);
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<Order> {
        self.orders.get(id).map(|e| e.value().clone())
    }

    /// All orders, oldest first.
    fn snapshot(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders
    }

    /// Write the snapshot to a temp file, fsync, then rename over the real file.
    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        write_atomically(path, &bytes)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Pickup minutes are exclusive per location and day, counting PENDING
    /// orders carried over from earlier days.
    fn check_pickup_free(&self, candidate: &Order) -> Result<(), StoreError> {
        let Some(pickup) = candidate.pickup_time else {
            return Ok(());
        };
        for entry in self.orders.iter() {
            let other = entry.value();
            if other.id != candidate.id && candidate.collides_with(other) {
                return Err(StoreError::SlotTaken {
                    pickup,
                    holder: other.id,
                });
            }
        }
        Ok(())
    }

    fn check_level_free(&self, candidate: &Order) -> Result<(), StoreError> {
        let Some(level) = candidate.blocking_level else {
            return Ok(());
        };
        if candidate.status != OrderStatus::Blocked {
            return Ok(());
        }
        let day = candidate.created_on();
        let taken = self.orders.iter().any(|e| {
            let other = e.value();
            other.status == OrderStatus::Blocked
                && other.blocking_level == Some(level)
                && other.location_id == candidate.location_id
                && other.created_on() == day
        });
        if taken {
            return Err(StoreError::LevelTaken {
                location_id: candidate.location_id.clone(),
                level,
            });
        }
        Ok(())
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await
}

#[async_trait]
impl OrderStore for LocalOrderStore {
    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.snapshot())
    }

    async fn create(&self, order: Order) -> Result<Order, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(order.id));
        }
        self.check_pickup_free(&order)?;
        self.check_level_free(&order)?;

        self.orders.insert(order.id, order.clone());
        if let Err(e) = self.persist().await {
            self.orders.remove(&order.id);
            return Err(e);
        }
        self.notify.send(
            &order.location_id,
            &StoreEvent::OrderCreated {
                order: order.clone(),
            },
        );
        Ok(order)
    }

    async fn update(&self, id: Ulid, patch: OrderPatch) -> Result<Order, StoreError> {
        let _guard = self.write_lock.lock().await;
        let previous = self.get(&id).ok_or(StoreError::NotFound(id))?;
        if previous.status == OrderStatus::Blocked {
            return Err(StoreError::Immutable(id));
        }
        if let Some(expected) = patch.expected_version
            && expected != previous.version
        {
            return Err(StoreError::VersionMismatch {
                id,
                expected,
                actual: previous.version,
            });
        }

        let mut next = previous.clone();
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(pickup) = patch.pickup_time {
            next.pickup_time = Some(pickup);
        }
        next.version += 1;
        // Only a new minute, or a status that holds more days, can collide.
        let widened = (!previous.is_active() && next.is_active())
            || (previous.status != OrderStatus::Pending && next.status == OrderStatus::Pending);
        if patch.pickup_time.is_some() || widened {
            self.check_pickup_free(&next)?;
        }

        self.orders.insert(id, next.clone());
        if let Err(e) = self.persist().await {
            self.orders.insert(id, previous);
            return Err(e);
        }
        self.notify.send(
            &next.location_id,
            &StoreEvent::OrderUpdated {
                order: next.clone(),
            },
        );
        Ok(next)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let previous = self.snapshot();
        self.orders.clear();
        if let Err(e) = self.persist().await {
            for order in previous {
                self.orders.insert(order.id, order);
            }
            return Err(e);
        }
        self.notify.send_all(&StoreEvent::OrdersCleared);
        Ok(())
    }

    fn subscribe(&self, location_id: &str) -> broadcast::Receiver<StoreEvent> {
        self.notify.subscribe(location_id)
    }
}
