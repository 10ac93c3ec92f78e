use std::io;
use std::path::Path;

use async_trait::async_trait;

use crate::model::Location;
use crate::store::StoreError;

/// Read-only source of location configuration.
#[async_trait]
pub trait LocationCalendar: Send + Sync {
    async fn list(&self) -> Result<Vec<Location>, StoreError>;
}

/// Calendar fixed at startup, loaded from a JSON array of locations.
pub struct StaticCalendar {
    locations: Vec<Location>,
}

impl StaticCalendar {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    /// One location called `main` with the default weekly profile.
    pub fn default_location() -> Self {
        let mut main = Location::new("main");
        main.name = Some("Main kitchen".into());
        Self::new(vec![main])
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let locations: Vec<Location> = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(locations))
    }
}

#[async_trait]
impl LocationCalendar for StaticCalendar {
    async fn list(&self) -> Result<Vec<Location>, StoreError> {
        Ok(self.locations.clone())
    }
}
