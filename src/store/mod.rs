//! Collaborator interfaces
//!
//! The engine never talks to a particular storage technology. Readings,
//! baseline history, emission factors and buildings are reached through
//! these traits; [`crate::db::Database`] implements all of them on SQLite.

use crate::core::{BaselineRecord, Building, EmissionFactor, MeterReading, NewBaselineRecord, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Read access to metered consumption
pub trait ReadingStore {
    /// Most recent readings for a building, newest first
    fn fetch_recent(&self, building_id: Uuid, limit: usize) -> Result<Vec<MeterReading>>;

    /// Sum of `value_kwh` with `start <= time <= end`; 0.0 when nothing matches
    fn sum_in_range(&self, building_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64>;
}

/// Append-only history of baseline calculations
///
/// Several records may exist for one `(building_id, period)`. The effective
/// baseline is the one with the latest `created_at` (insertion order breaks
/// ties). Two calculations racing on the same building and period both land;
/// whichever commits last becomes authoritative. That race is accepted.
pub trait BaselineStore {
    /// Persist a record, returning it with its id and creation time
    fn append(&self, record: NewBaselineRecord) -> Result<BaselineRecord>;

    /// Effective baseline for a period
    fn most_recent_for(&self, building_id: Uuid, period: &str) -> Result<Option<BaselineRecord>>;

    /// Every record of a building, oldest first
    fn all_for(&self, building_id: Uuid) -> Result<Vec<BaselineRecord>>;
}

/// Lookup of published grid emission factors
pub trait EmissionFactorLookup {
    fn by_region_year(&self, region_id: &str, year: i32) -> Result<Option<EmissionFactor>>;
}

/// Lookup of building metadata
pub trait BuildingLookup {
    fn by_id(&self, building_id: Uuid) -> Result<Option<Building>>;
}
