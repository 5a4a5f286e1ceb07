//! Month sample source
//!
//! Resolves the samples a baseline is computed from: the caller's own months
//! when given, otherwise the most recent meter readings of the building.

use crate::core::{Error, MonthSample, Result};
use crate::store::ReadingStore;
use uuid::Uuid;

/// Number of readings fetched when the caller supplies no months
pub const DEFAULT_HISTORY_MONTHS: usize = 12;

pub struct MonthSampleSource<'a> {
    readings: &'a dyn ReadingStore,
    history_months: usize,
}

impl<'a> MonthSampleSource<'a> {
    pub fn new(readings: &'a dyn ReadingStore) -> Self {
        Self {
            readings,
            history_months: DEFAULT_HISTORY_MONTHS,
        }
    }

    pub fn with_history_months(mut self, months: usize) -> Self {
        self.history_months = months;
        self
    }

    /// Samples for a building
    ///
    /// Non-empty explicit months are validated and used verbatim. Otherwise
    /// each fetched reading becomes one sample keyed by its month; readings
    /// that share a month are kept as separate samples.
    pub fn resolve(&self, building_id: Uuid, explicit_months: Option<&[MonthSample]>) -> Result<Vec<MonthSample>> {
        if let Some(months) = explicit_months.filter(|m| !m.is_empty()) {
            for month in months {
                month.validate()?;
            }
            log::debug!("Using {} caller-supplied months for building {}", months.len(), building_id);
            return Ok(months.to_vec());
        }

        let readings = self.readings.fetch_recent(building_id, self.history_months)?;
        if readings.is_empty() {
            return Err(Error::NoData(format!(
                "no meter readings found for building {}",
                building_id
            )));
        }

        log::debug!("Fetched {} recent readings for building {}", readings.len(), building_id);
        Ok(readings
            .iter()
            .map(|r| MonthSample::new(&r.period(), r.value_kwh))
            .collect())
    }
}
