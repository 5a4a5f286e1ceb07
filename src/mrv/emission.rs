//! Emission factor and region resolution
//!
//! An avoided-emissions estimate must always be producible, so a missing
//! factor is replaced by a default and marked as such instead of failing.

use crate::core::{Building, FactorSource, MrvConfig, Result};
use crate::store::EmissionFactorLookup;

/// Trait for deciding which grid region a building draws from
pub trait RegionResolver {
    fn resolve(&self, building: &Building) -> Option<String>;
}

/// Same region for every building
pub struct FixedRegion(pub String);

impl RegionResolver for FixedRegion {
    fn resolve(&self, _building: &Building) -> Option<String> {
        Some(self.0.clone())
    }
}

/// The building's own region, or a fallback when it has none
pub struct BuildingRegion {
    fallback: Option<String>,
}

impl BuildingRegion {
    pub fn new(fallback: Option<String>) -> Self {
        Self { fallback }
    }
}

/// Falls back to the configured default region
impl Default for BuildingRegion {
    fn default() -> Self {
        Self::new(Some(MrvConfig::default().default_region))
    }
}

impl RegionResolver for BuildingRegion {
    fn resolve(&self, building: &Building) -> Option<String> {
        building.region_id.clone().or_else(|| self.fallback.clone())
    }
}

/// Factor value and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFactor {
    pub kg_per_kwh: f64,
    pub source: FactorSource,
}

/// Looks up factors by region and year, substituting the default
pub struct EmissionFactorResolver<'a> {
    lookup: &'a dyn EmissionFactorLookup,
    default_factor: f64,
}

impl<'a> EmissionFactorResolver<'a> {
    pub fn new(lookup: &'a dyn EmissionFactorLookup, default_factor: f64) -> Self {
        Self { lookup, default_factor }
    }

    pub fn resolve(&self, region_id: Option<&str>, year: i32) -> Result<ResolvedFactor> {
        if let Some(region_id) = region_id {
            if let Some(factor) = self.lookup.by_region_year(region_id, year)? {
                return Ok(ResolvedFactor {
                    kg_per_kwh: factor.factor_kg_per_kwh,
                    source: FactorSource::Regional {
                        region_id: factor.region_id,
                        year: factor.year,
                    },
                });
            }
        }

        log::warn!(
            "No emission factor for region {} year {}, using default {} kg/kWh",
            region_id.unwrap_or("<unknown>"),
            year,
            self.default_factor
        );
        Ok(ResolvedFactor {
            kg_per_kwh: self.default_factor,
            source: FactorSource::Default,
        })
    }
}
