//! Common types used across the engine

use crate::core::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format of a billing period identifier
pub const PERIOD_FORMAT: &str = "%Y-%m";

/// One month of consumption used as baseline input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSample {
    /// Calendar month, "YYYY-MM"
    pub period: String,
    pub kwh: f64,
}

impl MonthSample {
    pub fn new(period: &str, kwh: f64) -> Self {
        Self {
            period: period.to_string(),
            kwh,
        }
    }

    /// Reject samples a caller could not have meant
    pub fn validate(&self) -> Result<()> {
        parse_period(&self.period)?;
        if !self.kwh.is_finite() || self.kwh < 0.0 {
            return Err(Error::InvalidInput(format!(
                "kwh for period {} must be a non-negative number, got {}",
                self.period, self.kwh
            )));
        }
        Ok(())
    }
}

/// Where a meter reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadingSource {
    Api,
    Csv,
    Manual,
}

impl ReadingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingSource::Api => "API",
            ReadingSource::Csv => "CSV",
            ReadingSource::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "API" => Some(ReadingSource::Api),
            "CSV" => Some(ReadingSource::Csv),
            "MANUAL" => Some(ReadingSource::Manual),
            _ => None,
        }
    }
}

/// A metered consumption value for a building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub building_id: Uuid,
    pub time: DateTime<Utc>,
    pub value_kwh: f64,
    pub source: ReadingSource,
}

impl MeterReading {
    pub fn new(building_id: Uuid, time: DateTime<Utc>, value_kwh: f64, source: ReadingSource) -> Self {
        Self {
            building_id,
            time,
            value_kwh,
            source,
        }
    }

    /// Billing period this reading belongs to
    pub fn period(&self) -> String {
        period_of(&self.time)
    }
}

/// Baseline record as produced by the aggregator, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBaselineRecord {
    pub building_id: Uuid,
    pub period: String,
    /// Mean of the unfiltered samples
    pub raw_kwh: f64,
    /// Output of the full normalization pipeline
    pub adjusted_kwh: f64,
    pub weather_factor: f64,
    pub occupancy_factor: f64,
    pub method: String,
}

/// Persisted, immutable entry of the baseline history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub id: i64,
    pub building_id: Uuid,
    pub period: String,
    pub raw_kwh: f64,
    pub adjusted_kwh: f64,
    pub weather_factor: f64,
    pub occupancy_factor: f64,
    pub method: String,
    pub created_at: DateTime<Utc>,
}

/// Grid emission factor for a region and year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactor {
    /// e.g. "US-CA", "IN-MH"
    pub region_id: String,
    pub region_name: String,
    pub year: i32,
    pub factor_kg_per_kwh: f64,
    /// Publisher, e.g. "EPA"
    pub source: String,
}

/// The slice of a building the engine needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: Uuid,
    pub name: String,
    pub region_id: Option<String>,
}

/// How the emission factor of a savings result was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactorSource {
    /// Found in the factor table
    Regional { region_id: String, year: i32 },
    /// Nothing published for the region/year, default substituted
    Default,
}

/// Savings, avoided emissions and credits for one building and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsResult {
    pub period: String,
    pub baseline_kwh: f64,
    pub actual_kwh: f64,
    pub savings_kwh: f64,
    /// kg CO2 per kWh
    pub emission_factor: f64,
    pub factor_source: FactorSource,
    pub co2_saved_kg: f64,
    /// One credit is one metric ton of CO2
    pub credits_estimated: f64,
}

/// Parse a "YYYY-MM" period into the first day of that month
pub fn parse_period(period: &str) -> Result<NaiveDate> {
    let valid_shape = period.len() == 7 && period.as_bytes()[4] == b'-';
    valid_shape
        .then(|| NaiveDate::parse_from_str(&format!("{}-01", period), "%Y-%m-%d").ok())
        .flatten()
        .ok_or_else(|| Error::InvalidInput(format!("period '{}' is not in YYYY-MM form", period)))
}

/// "YYYY-MM" for a timestamp
pub fn period_of(time: &DateTime<Utc>) -> String {
    time.format(PERIOD_FORMAT).to_string()
}

/// Round to two decimals for presentation
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Arithmetic mean of sample values, `None` for an empty slice
///
/// Running mean, so values near `f64::MAX` do not overflow through the sum.
pub fn mean_kwh(samples: &[MonthSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mean = samples
        .iter()
        .enumerate()
        .fold(0.0, |acc, (i, s)| acc + (s.kwh - acc) / (i + 1) as f64);
    Some(mean)
}
