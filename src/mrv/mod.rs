//! Savings, avoided CO2 and credit estimation
//!
//! Combines actual metered usage for a date range with the effective
//! baseline of the range's first month and the grid emission factor:
//!
//! - savings = max(0, baseline - actual)
//! - co2 = savings * factor
//! - credits = co2 / 1000 (one credit per metric ton)

pub mod emission;

use crate::core::{period_of, Error, MrvConfig, Result, SavingsResult};
use crate::store::{BaselineStore, BuildingLookup, EmissionFactorLookup, ReadingStore};
use chrono::{DateTime, Datelike, Utc};
use emission::{BuildingRegion, EmissionFactorResolver, RegionResolver};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// kg of CO2 in one credit
pub const KG_PER_CREDIT: f64 = 1000.0;

/// Result of CalculateSavings
///
/// Missing baselines and buildings are expected business outcomes, not
/// errors; callers branch on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SavingsOutcome {
    Computed(SavingsResult),
    BaselineNotFound { period: String },
    BuildingNotFound { building_id: Uuid },
}

impl SavingsOutcome {
    /// The computed result, if there is one
    pub fn result(&self) -> Option<&SavingsResult> {
        match self {
            SavingsOutcome::Computed(result) => Some(result),
            _ => None,
        }
    }

    /// Human readable reason for a not-found outcome
    pub fn not_found_message(&self) -> Option<String> {
        match self {
            SavingsOutcome::Computed(_) => None,
            SavingsOutcome::BaselineNotFound { period } => {
                Some(format!("No baseline found for period {}", period))
            }
            SavingsOutcome::BuildingNotFound { building_id } => {
                Some(format!("Building {} not found", building_id))
            }
        }
    }
}

/// Savings, avoided CO2 (kg) and credits for a baseline/actual pair
pub fn compute_savings(baseline_kwh: f64, actual_kwh: f64, factor_kg_per_kwh: f64) -> (f64, f64, f64) {
    let savings_kwh = (baseline_kwh - actual_kwh).max(0.0);
    let co2_saved_kg = savings_kwh * factor_kg_per_kwh;
    let credits_estimated = co2_saved_kg / KG_PER_CREDIT;
    (savings_kwh, co2_saved_kg, credits_estimated)
}

/// CalculateSavings over the collaborator stores
pub struct SavingsCalculator<'a> {
    readings: &'a dyn ReadingStore,
    history: &'a dyn BaselineStore,
    factors: &'a dyn EmissionFactorLookup,
    buildings: &'a dyn BuildingLookup,
    regions: Box<dyn RegionResolver + Send + Sync>,
    default_factor: f64,
}

impl<'a> SavingsCalculator<'a> {
    /// Calculator with the default `[mrv]` settings
    pub fn new(
        readings: &'a dyn ReadingStore,
        history: &'a dyn BaselineStore,
        factors: &'a dyn EmissionFactorLookup,
        buildings: &'a dyn BuildingLookup,
    ) -> Self {
        Self::from_config(readings, history, factors, buildings, &MrvConfig::default())
    }

    /// Calculator configured from the `[mrv]` section
    pub fn from_config(
        readings: &'a dyn ReadingStore,
        history: &'a dyn BaselineStore,
        factors: &'a dyn EmissionFactorLookup,
        buildings: &'a dyn BuildingLookup,
        config: &MrvConfig,
    ) -> Self {
        Self {
            readings,
            history,
            factors,
            buildings,
            regions: Box::new(BuildingRegion::new(Some(config.default_region.clone()))),
            default_factor: config.default_emission_factor,
        }
    }

    /// Replace how buildings map to grid regions
    pub fn with_region_resolver(mut self, resolver: impl RegionResolver + Send + Sync + 'static) -> Self {
        self.regions = Box::new(resolver);
        self
    }

    /// Savings for a building between two instants (both inclusive)
    ///
    /// The baseline used is the effective one for the month of `period_start`.
    pub fn calculate(
        &self,
        building_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<SavingsOutcome> {
        if period_start > period_end {
            return Err(Error::InvalidInput(format!(
                "period start {} is after period end {}",
                period_start, period_end
            )));
        }

        let actual_kwh = self.readings.sum_in_range(building_id, period_start, period_end)?;

        let period = period_of(&period_start);
        let Some(baseline) = self.history.most_recent_for(building_id, &period)? else {
            log::info!("No baseline for building {} period {}", building_id, period);
            return Ok(SavingsOutcome::BaselineNotFound { period });
        };

        let Some(building) = self.buildings.by_id(building_id)? else {
            log::info!("Building {} not found", building_id);
            return Ok(SavingsOutcome::BuildingNotFound { building_id });
        };

        let region_id = self.regions.resolve(&building);
        let factor = EmissionFactorResolver::new(self.factors, self.default_factor)
            .resolve(region_id.as_deref(), period_start.year())?;

        let (savings_kwh, co2_saved_kg, credits_estimated) =
            compute_savings(baseline.adjusted_kwh, actual_kwh, factor.kg_per_kwh);

        log::info!(
            "Savings for building {} period {}: {:.2} kWh, {:.2} kg CO2, {:.4} credits",
            building_id,
            period,
            savings_kwh,
            co2_saved_kg,
            credits_estimated
        );

        Ok(SavingsOutcome::Computed(SavingsResult {
            period,
            baseline_kwh: baseline.adjusted_kwh,
            actual_kwh,
            savings_kwh,
            emission_factor: factor.kg_per_kwh,
            factor_source: factor.source,
            co2_saved_kg,
            credits_estimated,
        }))
    }
}
